//! Readers for retired store formats, newest first.
//!
//! Both legacy formats store `base64(IV ‖ ct ‖ MAC)` over a JSON
//! [`SettingsRecord`]. They differ from the current scheme, and from each
//! other, in the KDF hash, work factor, MAC hash, and the text the MAC
//! is computed over.

use hashpass_types::{HashpassError, Result, SettingsRecord};

use crate::cipher::{Cipher, HashAlg, MacInput, Scheme};

/// A strategy that recovers a settings record from one retired format.
pub trait Reader: Send + Sync {
    /// Short name used in logs and reports.
    fn version(&self) -> &str;

    /// Decrypt and parse `blob`.
    fn read(&self, passphrase: &str, blob: &str) -> Result<SettingsRecord>;
}

/// A [`Reader`] for a format expressible as a cipher [`Scheme`].
#[derive(Debug, Clone)]
pub struct SchemeReader {
    version: &'static str,
    scheme: Scheme,
}

impl SchemeReader {
    /// Second-generation format: SHA-1 KDF, HMAC-SHA256 over the base64 text.
    pub const V2: SchemeReader = SchemeReader {
        version: "v2",
        scheme: Scheme {
            kdf: HashAlg::Sha1,
            work: 1000,
            mac: HashAlg::Sha256,
            mac_input: MacInput::Base64,
        },
    };

    /// First-generation format: SHA-1 KDF, HMAC-SHA1 over the hex text.
    pub const V1: SchemeReader = SchemeReader {
        version: "v1",
        scheme: Scheme {
            kdf: HashAlg::Sha1,
            work: 100,
            mac: HashAlg::Sha1,
            mac_input: MacInput::Hex,
        },
    };

    /// The scheme this reader decrypts.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }
}

impl Reader for SchemeReader {
    fn version(&self) -> &str {
        self.version
    }

    fn read(&self, passphrase: &str, blob: &str) -> Result<SettingsRecord> {
        let cipher = Cipher::with_scheme(self.scheme, passphrase.as_bytes())?;
        let plaintext = cipher.decrypt(blob)?;
        serde_json::from_slice(&plaintext).map_err(|_| HashpassError::unreadable())
    }
}

/// Every known legacy reader, newest format first.
pub fn legacy_readers() -> Vec<Box<dyn Reader>> {
    vec![Box::new(SchemeReader::V2), Box::new(SchemeReader::V1)]
}
