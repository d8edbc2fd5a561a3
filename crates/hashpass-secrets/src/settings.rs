//! Encrypted settings records on top of a [`Source`].
//!
//! Layout on a source:
//! - `global`: the source-wide defaults
//! - `services/<name>`: one record per service
//!
//! Each value is a [`Cipher`] blob over the JSON of a [`ServiceSettings`].

use hashpass_types::{
    HashpassError, Result, ServiceName, ServiceSettings, SettingsRecord, Source,
};
use std::sync::Arc;

use crate::cipher::Cipher;

/// Key of the source-wide record.
pub const GLOBAL_KEY: &str = "global";

/// Key prefix of per-service records.
pub const SERVICES_PREFIX: &str = "services/";

fn service_key(service: &ServiceName) -> String {
    format!("{}{}", SERVICES_PREFIX, service)
}

/// Settings-level view of one source.
#[derive(Clone)]
pub struct SettingsStore {
    source: Arc<dyn Source>,
    cipher: Arc<Cipher>,
}

impl SettingsStore {
    /// Wrap `source`, encrypting every record with `cipher`.
    pub fn new(source: Arc<dyn Source>, cipher: Arc<Cipher>) -> Self {
        Self { source, cipher }
    }

    /// Name of the underlying source.
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// The underlying source.
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    async fn read(&self, key: &str) -> Result<Option<ServiceSettings>> {
        let Some(bytes) = self.source.load(key).await? else {
            return Ok(None);
        };
        let blob = std::str::from_utf8(&bytes).map_err(|_| HashpassError::unreadable())?;
        let plaintext = self.cipher.decrypt(blob)?;
        let settings = serde_json::from_slice(&plaintext).map_err(|_| HashpassError::unreadable())?;
        Ok(Some(settings))
    }

    fn seal(&self, settings: &ServiceSettings) -> Result<String> {
        let plaintext = serde_json::to_vec(settings)?;
        self.cipher.encrypt(&plaintext)
    }

    async fn write(&self, key: &str, settings: &ServiceSettings) -> Result<()> {
        let blob = self.seal(settings)?;
        self.source.dump(key, blob.as_bytes()).await
    }

    /// The source-wide defaults; empty when none are stored.
    pub async fn global(&self) -> Result<ServiceSettings> {
        Ok(self.read(GLOBAL_KEY).await?.unwrap_or_default())
    }

    /// The record stored for `service`, if any.
    pub async fn service(&self, service: &ServiceName) -> Result<Option<ServiceSettings>> {
        self.read(&service_key(service)).await
    }

    /// Names of every service with a record, sorted.
    pub async fn list(&self) -> Result<Vec<ServiceName>> {
        let mut names = self
            .source
            .list(SERVICES_PREFIX)
            .await?
            .into_iter()
            .map(|name| {
                ServiceName::new(&name).map_err(|_| {
                    HashpassError::Store(format!(
                        "Source '{}' holds an invalid service key '{}'",
                        self.name(),
                        name.escape_debug()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Replace the source-wide defaults.
    pub async fn save_global(&self, settings: &ServiceSettings) -> Result<()> {
        self.write(GLOBAL_KEY, settings).await
    }

    /// Replace the record for `service`.
    pub async fn save_service(&self, service: &ServiceName, settings: &ServiceSettings) -> Result<()> {
        self.write(&service_key(service), settings).await
    }

    /// Delete the record for `service`.
    pub async fn delete_service(&self, service: &ServiceName) -> Result<()> {
        self.source.remove(&service_key(service)).await
    }

    /// Delete every record, global included.
    pub async fn clear(&self) -> Result<()> {
        for service in self.list().await? {
            self.delete_service(&service).await?;
        }
        self.source.remove(GLOBAL_KEY).await
    }

    /// Read everything into one record.
    pub async fn export(&self) -> Result<SettingsRecord> {
        let mut record = SettingsRecord {
            global: self.global().await?,
            ..Default::default()
        };
        for service in self.list().await? {
            if let Some(settings) = self.service(&service).await? {
                record.services.insert(service, settings);
            }
        }
        Ok(record)
    }

    /// Replace the whole contents of the source with `record`.
    ///
    /// Every record is written before anything is removed, so a failure part
    /// way leaves each previously stored service readable (old or new value).
    pub async fn import(&self, record: &SettingsRecord) -> Result<()> {
        let existing = self.list().await?;

        let mut sealed = Vec::with_capacity(record.services.len() + 1);
        sealed.push((GLOBAL_KEY.to_string(), self.seal(&record.global)?));
        for (service, settings) in &record.services {
            sealed.push((service_key(service), self.seal(settings)?));
        }
        for (key, blob) in &sealed {
            self.source.dump(key, blob.as_bytes()).await?;
        }

        for service in existing.iter().filter(|s| !record.services.contains_key(*s)) {
            self.delete_service(service).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashpass_services::MemorySource;
    use hashpass_types::ClassValue;

    fn store() -> (Arc<MemorySource>, SettingsStore) {
        let source = Arc::new(MemorySource::new("mem"));
        let cipher = Arc::new(Cipher::new("store passphrase", 10).unwrap());
        (source.clone(), SettingsStore::new(source, cipher))
    }

    fn svc(name: &str) -> ServiceName {
        ServiceName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (_, store) = store();
        assert!(store.global().await.unwrap().is_empty());
        assert_eq!(store.service(&svc("google")).await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_encrypted_on_the_source() {
        let (source, store) = store();
        let settings = ServiceSettings {
            notes: Some("recovery codes: 1234".into()),
            ..Default::default()
        };
        store.save_service(&svc("google"), &settings).await.unwrap();

        let raw = source.load("services/google").await.unwrap().unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("recovery"));
        assert_eq!(store.service(&svc("google")).await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_export_import_and_clear() {
        let (source, store) = store();
        let mut record = SettingsRecord::default();
        record.global.length = Some(24);
        record.services.insert(svc("twitter"), ServiceSettings {
            space: Some(ClassValue::Flag(false)),
            ..Default::default()
        });
        record.services.insert(svc("google"), ServiceSettings::default());

        store.save_service(&svc("stale"), &ServiceSettings::default()).await.unwrap();
        store.import(&record).await.unwrap();

        assert_eq!(store.export().await.unwrap(), record);
        assert_eq!(store.list().await.unwrap(), vec![svc("google"), svc("twitter")]);

        store.clear().await.unwrap();
        assert!(source.is_empty().await);
    }

    /// Memory source whose writes to one key always fail.
    struct RejectingSource {
        inner: MemorySource,
        rejected: &'static str,
    }

    #[async_trait::async_trait]
    impl Source for RejectingSource {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.load(key).await
        }
        async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
            if key == self.rejected {
                return Err(HashpassError::source_query(self.inner.name(), "write refused"));
            }
            self.inner.dump(key, bytes).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list(prefix).await
        }
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn kind(&self) -> hashpass_types::SourceKind {
            hashpass_types::SourceKind::Memory
        }
    }

    #[tokio::test]
    async fn test_failed_import_keeps_existing_records() {
        let source = Arc::new(RejectingSource {
            inner: MemorySource::new("mem"),
            rejected: "services/new",
        });
        let cipher = Arc::new(Cipher::new("store passphrase", 10).unwrap());
        let store = SettingsStore::new(source, cipher);
        let keep = ServiceSettings {
            length: Some(12),
            ..Default::default()
        };
        store.save_service(&svc("keep"), &keep).await.unwrap();

        let mut record = SettingsRecord::default();
        record.services.insert(svc("new"), ServiceSettings::default());
        assert!(store.import(&record).await.is_err());

        assert_eq!(store.service(&svc("keep")).await.unwrap(), Some(keep));
    }

    #[tokio::test]
    async fn test_delete_service() {
        let (_, store) = store();
        store.save_service(&svc("google"), &ServiceSettings::default()).await.unwrap();
        store.delete_service(&svc("google")).await.unwrap();
        assert_eq!(store.service(&svc("google")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_blob_is_unreadable() {
        let (source, store) = store();
        source.dump("global", b"\xff\xfe").await.unwrap();
        assert!(matches!(store.global().await, Err(HashpassError::Decrypt(_))));

        let other = Cipher::new("another passphrase", 10).unwrap();
        let blob = other.encrypt(br#"{"length": 8}"#).unwrap();
        source.dump("global", blob.as_bytes()).await.unwrap();
        assert!(matches!(store.global().await, Err(HashpassError::Decrypt(_))));
    }
}
