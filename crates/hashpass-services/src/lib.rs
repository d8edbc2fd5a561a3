//! # Hashpass Services
//!
//! Settings source backends for hashpass.
//!
//! This crate provides [`Source`] implementations for:
//! - **Local**: an encrypted store file on disk
//! - **Remote**: an HTTP key/value storage account
//! - **Memory**: an in-process map
//!
//! Sources only move opaque blobs. Encryption happens in `hashpass-secrets`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod local;
pub mod memory;
pub mod remote;

pub use local::{is_current_format, LocalFileSource, StoreDocument};
pub use memory::MemorySource;
pub use remote::{RemoteConfig, RemoteSource};

use hashpass_types::config::SourceConfig;
use hashpass_types::{HashpassError, Result, Source, SourceKind};
use std::sync::Arc;

/// Build the backend described by a source configuration.
pub fn open_source(config: &SourceConfig) -> Result<Arc<dyn Source>> {
    let name = config.name.to_string();
    let source: Arc<dyn Source> = match config.kind {
        SourceKind::Local => {
            let path = config.path.clone().ok_or_else(|| {
                HashpassError::Config(format!("Local source '{}' needs a path", name))
            })?;
            Arc::new(LocalFileSource::new(name, path))
        }
        SourceKind::Remote => {
            let url = config.url.clone().ok_or_else(|| {
                HashpassError::Config(format!("Remote source '{}' needs a url", name))
            })?;
            Arc::new(RemoteSource::new(RemoteConfig {
                name,
                url,
                token: config.token.clone(),
                insecure: false,
            })?)
        }
        SourceKind::Memory => Arc::new(MemorySource::new(name)),
    };
    tracing::debug!("opened {} source '{}'", source.kind(), source.name());
    Ok(source)
}
