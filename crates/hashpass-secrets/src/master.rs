//! Master secrets: a passphrase, or a signature from an external key.

use hashpass_types::{HashpassError, Result, ServiceSettings, Signer};
use std::fmt;
use zeroize::Zeroizing;

use crate::generator::DOMAIN_CONSTANT;

/// The secret every generated password is derived from. Never persisted.
pub enum MasterSecret {
    /// A passphrase typed by the user
    Phrase(Zeroizing<String>),
    /// A signature over [`DOMAIN_CONSTANT`] made by an externally held key
    Signature(Zeroizing<Vec<u8>>),
}

impl MasterSecret {
    /// Wrap a passphrase.
    pub fn phrase(phrase: impl Into<String>) -> Self {
        MasterSecret::Phrase(Zeroizing::new(phrase.into()))
    }

    /// Wrap signature bytes.
    pub fn from_signature(signature: Vec<u8>) -> Self {
        MasterSecret::Signature(Zeroizing::new(signature))
    }

    /// Ask `signer` to sign [`DOMAIN_CONSTANT`] with the key named by `key_ref`.
    ///
    /// The signer must be deterministic, otherwise every run yields
    /// different passwords.
    pub async fn from_signer(signer: &dyn Signer, key_ref: &str) -> Result<Self> {
        let signature = signer.sign(key_ref, DOMAIN_CONSTANT.as_bytes()).await?;
        if signature.is_empty() {
            return Err(HashpassError::Validation(format!(
                "Signer returned an empty signature for key '{}'",
                key_ref
            )));
        }
        tracing::debug!("derived master secret from key '{}'", key_ref);
        Ok(Self::from_signature(signature))
    }

    /// The master secret implied by resolved settings, if any.
    ///
    /// A `key` reference takes precedence over a stored `phrase`. A key with
    /// no signer available is an error.
    pub async fn from_settings(
        settings: &ServiceSettings,
        signer: Option<&dyn Signer>,
    ) -> Result<Option<Self>> {
        if let Some(key_ref) = &settings.key {
            let signer = signer.ok_or_else(|| {
                HashpassError::Config(format!("Settings name key '{}' but no signer is available", key_ref))
            })?;
            return Self::from_signer(signer, key_ref).await.map(Some);
        }
        Ok(settings.phrase.as_deref().map(|phrase| Self::phrase(phrase)))
    }

    /// Bytes fed into the entropy stream.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MasterSecret::Phrase(phrase) => phrase.as_bytes(),
            MasterSecret::Signature(signature) => signature.as_slice(),
        }
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterSecret::Phrase(_) => f.write_str("MasterSecret::Phrase(<redacted>)"),
            MasterSecret::Signature(_) => f.write_str("MasterSecret::Signature(<redacted>)"),
        }
    }
}
