//! Local encrypted store backed by a single JSON document.
//!
//! The file maps keys to base64 blobs:
//!
//! ```json
//! {"format": "hashpass-store", "version": 1, "entries": {"global": "…", "services/google": "…"}}
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hashpass_types::{HashpassError, Result, Source, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Format tag written into every current store file.
pub const STORE_FORMAT: &str = "hashpass-store";

/// Current store document version.
pub const STORE_VERSION: u32 = 1;

/// On-disk layout of a local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Always [`STORE_FORMAT`]
    pub format: String,
    /// Always [`STORE_VERSION`]
    pub version: u32,
    /// Key to base64 blob
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl StoreDocument {
    /// An empty current-format document.
    pub fn new() -> Self {
        Self {
            format: STORE_FORMAT.to_string(),
            version: STORE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `bytes` hold a current-format store document.
pub fn is_current_format(bytes: &[u8]) -> bool {
    serde_json::from_slice::<StoreDocument>(bytes)
        .map(|doc| doc.format == STORE_FORMAT && doc.version == STORE_VERSION)
        .unwrap_or(false)
}

/// A [`Source`] stored in one file on the local disk.
///
/// A missing file reads as an empty store. Writes replace the whole
/// document atomically.
pub struct LocalFileSource {
    name: String,
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalFileSource {
    /// Create a source over the store file at `path`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreDocument::new()),
            Err(e) => return Err(e.into()),
        };

        if !is_current_format(&bytes) {
            return Err(HashpassError::Store(format!(
                "{} is not a current-format store; migrate it first",
                self.path.display()
            )));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_document(&self, doc: &StoreDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || hashpass_core::util::write_atomic(&path, &bytes))
            .await
            .map_err(|e| HashpassError::Store(format!("Store write task failed: {}", e)))?
    }
}

#[async_trait]
impl Source for LocalFileSource {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let doc = self.read_document().await?;
        doc.entries
            .get(key)
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|_| {
                    HashpassError::Store(format!("Corrupt entry '{}' in {}", key, self.path.display()))
                })
            })
            .transpose()
    }

    async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.entries.insert(key.to_string(), STANDARD.encode(bytes));
        self.write_document(&doc).await?;
        tracing::debug!("wrote '{}' to {}", key, self.path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        if doc.entries.remove(key).is_some() {
            self.write_document(&doc).await?;
            tracing::debug!("removed '{}' from {}", key, self.path.display());
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let doc = self.read_document().await?;
        Ok(doc
            .entries
            .keys()
            .filter_map(|k| k.strip_prefix(prefix))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }
}
