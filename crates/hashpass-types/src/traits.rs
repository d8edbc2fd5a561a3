//! Core trait definitions for hashpass abstractions.

use async_trait::async_trait;
use std::path::Path;
use crate::enums::SourceKind;
use crate::errors::Result;

/// Trait for settings storage backends.
///
/// Implementers store opaque byte blobs under string keys. Encryption and
/// record structure live above this layer, so a source never sees plaintext.
#[async_trait]
pub trait Source: Send + Sync {
    /// Read the blob stored under `key`.
    ///
    /// Returns `None` if nothing is stored there.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value.
    async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete the blob under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// List every key that starts with `prefix`, with the prefix stripped.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get the source name.
    fn name(&self) -> &str;

    /// Get the source kind.
    fn kind(&self) -> SourceKind;
}

/// Trait for signature-based master secret providers (e.g. an SSH agent).
///
/// The signature scheme must be deterministic for a given key and challenge,
/// otherwise generated secrets will differ between runs.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `challenge` with the key identified by `key_ref`.
    async fn sign(&self, key_ref: &str, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// Asks the user to approve a destructive rewrite of the store at `path`.
pub trait Confirmer: Send + Sync {
    /// Return `Ok(true)` to proceed.
    fn confirm(&self, path: &Path) -> Result<bool>;
}
