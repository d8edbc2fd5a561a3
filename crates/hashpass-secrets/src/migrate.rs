//! Migration of a legacy local store to the current format.
//!
//! The migrator walks `Detect → Confirm → TryReaders → Decrypted →
//! WriteNewStore → SwapFiles → Done`. It needs exclusive access to the store
//! path; the rename sequence is not crash-atomic.

use hashpass_core::util::unique_sibling;
use hashpass_services::{is_current_format, LocalFileSource};
use hashpass_types::{Confirmer, HashpassError, Result, SettingsRecord};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::cipher::Cipher;
use crate::legacy::{legacy_readers, Reader};
use crate::settings::SettingsStore;

/// Migration progress, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Looking for a legacy file
    Detect,
    /// Waiting for approval
    Confirm,
    /// Trying legacy readers, newest first
    TryReaders,
    /// A reader recovered the record
    Decrypted,
    /// Writing and verifying the replacement store
    WriteNewStore,
    /// Moving the old file aside and the new one into place
    SwapFiles,
    /// Finished
    Done,
    /// Gave up; the original file is back in place
    Failed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a completed migration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Where the legacy file was moved
    pub backup_path: PathBuf,
    /// Number of service records migrated
    pub services: usize,
    /// Reader that recovered the legacy file
    pub reader: String,
}

/// How a migration run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No file, or already current
    NotNeeded,
    /// The confirmer declined; nothing was touched
    Declined,
    /// The store was rewritten
    Migrated(MigrationReport),
}

/// The contents of `path` when it holds a legacy store.
async fn read_legacy(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if is_current_format(&bytes) => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Whether the file at `path` is a legacy store.
pub async fn needs_migration(path: impl AsRef<Path>) -> Result<bool> {
    Ok(read_legacy(path.as_ref()).await?.is_some())
}

/// Write `record` into `store` one record at a time, reading each back
/// before moving on, then check nothing else is present.
pub async fn write_verified(store: &SettingsStore, record: &SettingsRecord) -> Result<()> {
    store.save_global(&record.global).await?;
    if store.global().await? != record.global {
        return Err(HashpassError::Verification("global settings differ after write".to_string()));
    }
    for (service, settings) in &record.services {
        store.save_service(service, settings).await?;
        if store.service(service).await?.as_ref() != Some(settings) {
            return Err(HashpassError::Verification(format!(
                "settings for '{}' differ after write",
                service
            )));
        }
    }
    verify_store(store, record).await
}

/// Move `path` to `backup` and `tmp` into its place.
///
/// On failure the legacy file is back at `path` and `tmp` is removed.
async fn swap_files(path: &Path, tmp: &Path, backup: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::rename(path, backup).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(tmp, path).await {
        let _ = tokio::fs::rename(backup, path).await;
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Check that `store` reads back exactly `record`.
pub async fn verify_store(store: &SettingsStore, record: &SettingsRecord) -> Result<()> {
    if store.global().await? != record.global {
        return Err(HashpassError::Verification("global settings differ after write".to_string()));
    }
    for (service, expected) in &record.services {
        if store.service(service).await?.as_ref() != Some(expected) {
            return Err(HashpassError::Verification(format!(
                "settings for '{}' differ after write",
                service
            )));
        }
    }
    let written = store.list().await?.len();
    if written != record.services.len() {
        return Err(HashpassError::Verification(format!(
            "expected {} service records, found {}",
            record.services.len(),
            written
        )));
    }
    Ok(())
}

/// Rewrites a legacy store under the current cipher.
pub struct Migrator {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    work: u32,
    readers: Vec<Box<dyn Reader>>,
    confirmer: Arc<dyn Confirmer>,
}

impl Migrator {
    /// Migrate the store at `path`, re-encrypting with `passphrase` at `work`.
    pub fn new(
        path: impl Into<PathBuf>,
        passphrase: &str,
        work: u32,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            work,
            readers: legacy_readers(),
            confirmer,
        }
    }

    /// Replace the reader list.
    pub fn with_readers(mut self, readers: Vec<Box<dyn Reader>>) -> Self {
        self.readers = readers;
        self
    }

    fn enter(&self, state: MigrationState) {
        tracing::debug!("migration of {}: {}", self.path.display(), state);
    }

    /// Run the migration to completion.
    ///
    /// # Errors
    ///
    /// `MigrationFailed` when no reader can decrypt the file, `Verification`
    /// when the new store does not read back identically, `Io` when the
    /// files cannot be swapped. In every case the original file is left in
    /// place and the temporary store is removed.
    pub async fn run(&self) -> Result<MigrationOutcome> {
        self.enter(MigrationState::Detect);
        let Some(raw) = read_legacy(&self.path).await? else {
            return Ok(MigrationOutcome::NotNeeded);
        };
        let blob = String::from_utf8_lossy(&raw).trim().to_string();

        self.enter(MigrationState::Confirm);
        if !self.confirmer.confirm(&self.path)? {
            tracing::info!("migration of {} declined", self.path.display());
            return Ok(MigrationOutcome::Declined);
        }

        self.enter(MigrationState::TryReaders);
        let (record, reader) = match self.try_readers(&blob) {
            Ok(found) => found,
            Err(e) => {
                self.enter(MigrationState::Failed);
                return Err(e);
            }
        };
        self.enter(MigrationState::Decrypted);
        tracing::info!(
            "read {} with the {} reader ({} services)",
            self.path.display(),
            reader,
            record.services.len()
        );

        self.enter(MigrationState::WriteNewStore);
        let tmp = unique_sibling(&self.path, "migrate");
        if let Err(e) = self.write_new_store(&tmp, &record).await {
            self.enter(MigrationState::Failed);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        self.enter(MigrationState::SwapFiles);
        let backup_path = unique_sibling(&self.path, "backup");
        if let Err(e) = swap_files(&self.path, &tmp, &backup_path).await {
            self.enter(MigrationState::Failed);
            return Err(e);
        }

        self.enter(MigrationState::Done);
        tracing::info!(
            "migrated {}; legacy file kept at {}",
            self.path.display(),
            backup_path.display()
        );
        Ok(MigrationOutcome::Migrated(MigrationReport {
            backup_path,
            services: record.services.len(),
            reader,
        }))
    }

    fn try_readers(&self, blob: &str) -> Result<(SettingsRecord, String)> {
        for reader in &self.readers {
            match reader.read(&self.passphrase, blob) {
                Ok(record) => return Ok((record, reader.version().to_string())),
                Err(e) => tracing::warn!("{} reader could not read {}: {}", reader.version(), self.path.display(), e),
            }
        }
        Err(HashpassError::MigrationFailed(format!(
            "No legacy reader could decrypt {}",
            self.path.display()
        )))
    }

    async fn write_new_store(&self, tmp: &Path, record: &SettingsRecord) -> Result<()> {
        let cipher = Arc::new(Cipher::new(&self.passphrase, self.work)?);
        let store = SettingsStore::new(Arc::new(LocalFileSource::new("migration", tmp)), cipher);
        write_verified(&store, record).await
    }
}
