//! Multi-source settings resolution.
//!
//! Reads either go to one pinned source or fan out to every source at once.
//! When several sources hold a record for the same service, the default
//! source wins. Writes always target exactly one source.

use futures::future::try_join_all;
use hashpass_core::config::HashpassConfig;
use hashpass_types::{
    HashpassError, Result, ServiceName, ServiceSettings, SettingsRecord,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::cipher::Cipher;
use crate::policy::GenerationPolicy;
use crate::settings::SettingsStore;

/// Effective settings for one service and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Source whose records were used
    pub source: String,
    /// Service record merged over that source's global record
    pub settings: ServiceSettings,
}

/// Records fetched from one source. `generation` moves on every write, and a
/// fetch that started under an older generation is not stored.
#[derive(Default)]
struct SourceCache {
    generation: u64,
    global: Option<ServiceSettings>,
    services: HashMap<ServiceName, Option<ServiceSettings>>,
}

/// Resolves settings across a set of named stores.
pub struct Resolver {
    stores: Vec<SettingsStore>,
    default_index: usize,
    timeout: Duration,
    cache: RwLock<HashMap<String, SourceCache>>,
}

impl Resolver {
    /// Create a resolver over `stores`, with `default_source` breaking ties.
    pub fn new(stores: Vec<SettingsStore>, default_source: &str) -> Result<Self> {
        let mut seen = HashSet::new();
        for store in &stores {
            if !seen.insert(store.name().to_string()) {
                return Err(HashpassError::Config(format!("Duplicate source name: {}", store.name())));
            }
        }
        let default_index = stores
            .iter()
            .position(|s| s.name() == default_source)
            .ok_or_else(|| {
                HashpassError::Config(format!("Default source '{}' is not configured", default_source))
            })?;

        Ok(Self {
            stores,
            default_index,
            timeout: Duration::from_millis(hashpass_core::config::DEFAULT_QUERY_TIMEOUT_MS),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Open every configured source, sharing one cipher keyed by `passphrase`.
    pub fn from_config(config: &HashpassConfig, passphrase: &str) -> Result<Self> {
        let cipher = Arc::new(Cipher::new(passphrase, config.cipher_work)?);
        let stores = config
            .effective_sources()
            .iter()
            .map(|source| {
                hashpass_services::open_source(source)
                    .map(|source| SettingsStore::new(source, cipher.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(stores, config.default_source.as_str())?.with_timeout(config.query_timeout()))
    }

    /// Bound each source query by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the default source.
    pub fn default_source(&self) -> &str {
        self.stores[self.default_index].name()
    }

    /// Names of every source, in configuration order.
    pub fn source_names(&self) -> Vec<&str> {
        self.stores.iter().map(SettingsStore::name).collect()
    }

    fn store(&self, name: &str) -> Result<&SettingsStore> {
        self.stores
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| HashpassError::Config(format!("Unknown source: {}", name)))
    }

    /// The pinned store, or the default one.
    fn target(&self, pin: Option<&str>) -> Result<&SettingsStore> {
        match pin {
            Some(name) => self.store(name),
            None => Ok(&self.stores[self.default_index]),
        }
    }

    async fn bounded<T, F>(&self, store: &SettingsStore, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HashpassError::source_query(
                store.name(),
                format!("timed out after {}ms", self.timeout.as_millis()),
            )),
        }
    }

    /// Store a fetched value unless a write has landed since `generation`.
    async fn remember<F>(&self, store: &SettingsStore, generation: u64, fill: F)
    where
        F: FnOnce(&mut SourceCache),
    {
        let mut cache = self.cache.write().await;
        let entry = cache.entry(store.name().to_string()).or_default();
        if entry.generation == generation {
            fill(entry);
        } else {
            tracing::debug!("dropping fetch from '{}' that raced a write", store.name());
        }
    }

    async fn cached_global(&self, store: &SettingsStore) -> Result<ServiceSettings> {
        let generation = {
            let cache = self.cache.read().await;
            let entry = cache.get(store.name());
            if let Some(global) = entry.and_then(|c| c.global.clone()) {
                tracing::debug!("cache hit: global of '{}'", store.name());
                return Ok(global);
            }
            entry.map_or(0, |c| c.generation)
        };

        let global = self.bounded(store, store.global()).await?;
        let value = global.clone();
        self.remember(store, generation, move |c| c.global = Some(value)).await;
        Ok(global)
    }

    async fn cached_service(&self, store: &SettingsStore, service: &ServiceName) -> Result<Option<ServiceSettings>> {
        let generation = {
            let cache = self.cache.read().await;
            let entry = cache.get(store.name());
            if let Some(hit) = entry.and_then(|c| c.services.get(service).cloned()) {
                tracing::debug!("cache hit: '{}' on '{}'", service, store.name());
                return Ok(hit);
            }
            entry.map_or(0, |c| c.generation)
        };

        tracing::debug!("querying '{}' for '{}'", store.name(), service);
        let record = self.bounded(store, store.service(service)).await?;
        let value = record.clone();
        self.remember(store, generation, move |c| {
            c.services.insert(service.clone(), value);
        })
        .await;
        Ok(record)
    }

    async fn merged(&self, store: &SettingsStore, record: Option<ServiceSettings>) -> Result<Resolution> {
        let global = self.cached_global(store).await?;
        Ok(Resolution {
            source: store.name().to_string(),
            settings: match record {
                Some(record) => record.merged_over(&global),
                None => global,
            },
        })
    }

    /// Effective settings for `service`.
    ///
    /// With a pin, only that source is consulted. Otherwise every source is
    /// queried concurrently and the first error aborts the rest.
    pub async fn resolve(&self, service: &ServiceName, pin: Option<&str>) -> Result<Resolution> {
        if let Some(name) = pin {
            let store = self.store(name)?;
            let record = self.cached_service(store, service).await?;
            return self.merged(store, record).await;
        }

        let answers = try_join_all(self.stores.iter().enumerate().map(|(i, store)| async move {
            self.cached_service(store, service).await.map(|record| (i, record))
        }))
        .await?;

        let mut candidates: Vec<(usize, ServiceSettings)> = answers
            .into_iter()
            .filter_map(|(i, record)| record.map(|r| (i, r)))
            .collect();

        let default = &self.stores[self.default_index];
        match candidates.len() {
            0 => self.merged(default, None).await,
            1 => {
                let (i, record) = candidates.remove(0);
                self.merged(&self.stores[i], Some(record)).await
            }
            n => {
                let names: Vec<&str> = candidates.iter().map(|(i, _)| self.stores[*i].name()).collect();
                tracing::debug!("{} sources hold '{}' ({}); using '{}'", n, service, names.join(", "), default.name());
                let record = candidates
                    .into_iter()
                    .find(|(i, _)| *i == self.default_index)
                    .map(|(_, r)| r);
                self.merged(default, record).await
            }
        }
    }

    /// Shorthand for resolving straight to a generation policy.
    pub async fn policy(&self, service: &ServiceName, pin: Option<&str>) -> Result<GenerationPolicy> {
        let resolution = self.resolve(service, pin).await?;
        GenerationPolicy::from_settings(&resolution.settings)
    }

    /// Sorted, deduplicated service names across every source (or the pinned one).
    pub async fn list(&self, pin: Option<&str>) -> Result<Vec<ServiceName>> {
        if let Some(name) = pin {
            let store = self.store(name)?;
            return self.bounded(store, store.list()).await;
        }

        let listings = try_join_all(self.stores.iter().map(|store| self.bounded(store, store.list()))).await?;
        let names: BTreeSet<ServiceName> = listings.into_iter().flatten().collect();
        Ok(names.into_iter().collect())
    }

    /// Drop everything cached for `store`. Runs after every write, failed or
    /// not, since a failed write may still have changed some keys.
    async fn invalidate(&self, store: &SettingsStore) {
        let mut cache = self.cache.write().await;
        let entry = cache.entry(store.name().to_string()).or_default();
        entry.generation += 1;
        entry.global = None;
        entry.services.clear();
    }

    /// Replace the global record of the target source.
    pub async fn save_global(&self, settings: &ServiceSettings, pin: Option<&str>) -> Result<()> {
        let store = self.target(pin)?;
        let result = store.save_global(settings).await;
        self.invalidate(store).await;
        result?;
        tracing::info!("saved global settings to '{}'", store.name());
        Ok(())
    }

    /// Replace the record for `service` on the target source.
    pub async fn save_service(&self, service: &ServiceName, settings: &ServiceSettings, pin: Option<&str>) -> Result<()> {
        let store = self.target(pin)?;
        let result = store.save_service(service, settings).await;
        self.invalidate(store).await;
        result?;
        tracing::info!("saved settings for '{}' to '{}'", service, store.name());
        Ok(())
    }

    /// Delete the record for `service` on the target source.
    pub async fn delete_service(&self, service: &ServiceName, pin: Option<&str>) -> Result<()> {
        let store = self.target(pin)?;
        let result = store.delete_service(service).await;
        self.invalidate(store).await;
        result?;
        tracing::info!("deleted settings for '{}' from '{}'", service, store.name());
        Ok(())
    }

    /// Delete every record on the target source.
    pub async fn clear(&self, pin: Option<&str>) -> Result<()> {
        let store = self.target(pin)?;
        let result = store.clear().await;
        self.invalidate(store).await;
        result?;
        tracing::info!("cleared '{}'", store.name());
        Ok(())
    }

    /// Dump the target source into one record.
    pub async fn export(&self, pin: Option<&str>) -> Result<SettingsRecord> {
        self.target(pin)?.export().await
    }

    /// Replace the contents of the target source with `record`.
    pub async fn import(&self, record: &SettingsRecord, pin: Option<&str>) -> Result<()> {
        let store = self.target(pin)?;
        let result = store.import(record).await;
        self.invalidate(store).await;
        result?;
        tracing::info!("imported {} service records into '{}'", record.services.len(), store.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hashpass_services::MemorySource;
    use hashpass_types::{ClassValue, Source, SourceKind};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn cipher() -> Arc<Cipher> {
        Arc::new(Cipher::new("resolver passphrase", 10).unwrap())
    }

    fn svc(name: &str) -> ServiceName {
        ServiceName::new(name).unwrap()
    }

    fn memory(name: &str, cipher: &Arc<Cipher>) -> SettingsStore {
        SettingsStore::new(Arc::new(MemorySource::new(name)), cipher.clone())
    }

    fn length(n: u64) -> ServiceSettings {
        ServiceSettings {
            length: Some(n),
            ..Default::default()
        }
    }

    /// Fails or stalls every call.
    struct BrokenSource {
        name: String,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Source for BrokenSource {
        async fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            match self.delay {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(None)
                }
                None => Err(HashpassError::source_query(&self.name, "connection refused")),
            }
        }
        async fn dump(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(HashpassError::source_query(&self.name, "read-only"))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            self.load(prefix).await.map(|_| Vec::new())
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Remote
        }
    }

    /// Counts loads on a memory source.
    struct CountingSource {
        inner: MemorySource,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl Source for CountingSource {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(key).await
        }
        async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
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
        fn kind(&self) -> SourceKind {
            SourceKind::Memory
        }
    }

    #[tokio::test]
    async fn test_no_candidates_uses_default_global() {
        let c = cipher();
        let (a, b) = (memory("a", &c), memory("b", &c));
        a.save_global(&length(10)).await.unwrap();
        b.save_global(&length(30)).await.unwrap();
        let resolver = Resolver::new(vec![a, b], "b").unwrap();

        let resolution = resolver.resolve(&svc("google"), None).await.unwrap();
        assert_eq!(resolution.source, "b");
        assert_eq!(resolution.settings.length, Some(30));
    }

    #[tokio::test]
    async fn test_single_candidate_merges_over_its_own_global() {
        let c = cipher();
        let (a, b) = (memory("a", &c), memory("b", &c));
        a.save_global(&ServiceSettings {
            symbol: Some(ClassValue::Count(0)),
            ..Default::default()
        })
        .await
        .unwrap();
        a.save_service(&svc("google"), &length(12)).await.unwrap();
        b.save_global(&length(40)).await.unwrap();
        let resolver = Resolver::new(vec![a, b], "b").unwrap();

        let resolution = resolver.resolve(&svc("google"), None).await.unwrap();
        assert_eq!(resolution.source, "a");
        assert_eq!(resolution.settings.length, Some(12));
        assert_eq!(resolution.settings.symbol, Some(ClassValue::Count(0)));
    }

    #[tokio::test]
    async fn test_default_wins_ties() {
        let c = cipher();
        let (a, b) = (memory("a", &c), memory("b", &c));
        a.save_service(&svc("google"), &length(12)).await.unwrap();
        b.save_service(&svc("google"), &length(16)).await.unwrap();
        let resolver = Resolver::new(vec![a, b], "b").unwrap();

        let resolution = resolver.resolve(&svc("google"), None).await.unwrap();
        assert_eq!(resolution.source, "b");
        assert_eq!(resolution.settings.length, Some(16));
    }

    #[tokio::test]
    async fn test_tie_without_default_uses_default_global() {
        let c = cipher();
        let (a, b, d) = (memory("a", &c), memory("b", &c), memory("d", &c));
        a.save_service(&svc("google"), &length(12)).await.unwrap();
        b.save_service(&svc("google"), &length(16)).await.unwrap();
        d.save_global(&length(25)).await.unwrap();
        let resolver = Resolver::new(vec![a, b, d], "d").unwrap();

        let resolution = resolver.resolve(&svc("google"), None).await.unwrap();
        assert_eq!(resolution.source, "d");
        assert_eq!(resolution.settings.length, Some(25));
    }

    #[tokio::test]
    async fn test_pin_skips_fan_out() {
        let c = cipher();
        let a = memory("a", &c);
        a.save_service(&svc("google"), &length(12)).await.unwrap();
        let broken = SettingsStore::new(
            Arc::new(BrokenSource { name: "broken".into(), delay: None }),
            c.clone(),
        );
        let resolver = Resolver::new(vec![a, broken], "a").unwrap();

        let resolution = resolver.resolve(&svc("google"), Some("a")).await.unwrap();
        assert_eq!(resolution.settings.length, Some(12));
        assert!(resolver.resolve(&svc("google"), None).await.is_err());
        assert!(matches!(
            resolver.resolve(&svc("google"), Some("nope")).await,
            Err(HashpassError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_first_error_aborts_fan_out() {
        let c = cipher();
        let slow = SettingsStore::new(
            Arc::new(BrokenSource { name: "slow".into(), delay: Some(Duration::from_secs(30)) }),
            c.clone(),
        );
        let failing = SettingsStore::new(
            Arc::new(BrokenSource { name: "failing".into(), delay: None }),
            c.clone(),
        );
        let resolver = Resolver::new(vec![memory("a", &c), slow, failing], "a")
            .unwrap()
            .with_timeout(Duration::from_secs(60));

        let result = tokio::time::timeout(Duration::from_secs(5), resolver.resolve(&svc("google"), None))
            .await
            .expect("fan-out should not wait for the slow source");
        match result {
            Err(HashpassError::SourceQuery { source_name, .. }) => assert_eq!(source_name, "failing"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_timeout_names_source() {
        let c = cipher();
        let slow = SettingsStore::new(
            Arc::new(BrokenSource { name: "slow".into(), delay: Some(Duration::from_secs(30)) }),
            c.clone(),
        );
        let resolver = Resolver::new(vec![memory("a", &c), slow], "a")
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        match resolver.resolve(&svc("google"), None).await {
            Err(HashpassError::SourceQuery { source_name, message }) => {
                assert_eq!(source_name, "slow");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_is_sorted_union() {
        let c = cipher();
        let (a, b) = (memory("a", &c), memory("b", &c));
        a.save_service(&svc("twitter"), &length(1)).await.unwrap();
        a.save_service(&svc("google"), &length(1)).await.unwrap();
        b.save_service(&svc("google"), &length(1)).await.unwrap();
        b.save_service(&svc("bank"), &length(1)).await.unwrap();
        let resolver = Resolver::new(vec![a, b], "a").unwrap();

        assert_eq!(
            resolver.list(None).await.unwrap(),
            vec![svc("bank"), svc("google"), svc("twitter")]
        );
        assert_eq!(resolver.list(Some("b")).await.unwrap(), vec![svc("bank"), svc("google")]);
    }

    #[tokio::test]
    async fn test_writes_target_one_source_and_invalidate_cache() {
        let c = cipher();
        let counting = Arc::new(CountingSource {
            inner: MemorySource::new("a"),
            loads: AtomicUsize::new(0),
        });
        let a = SettingsStore::new(counting.clone(), c.clone());
        let b = memory("b", &c);
        let b_source = b.source().clone();
        let resolver = Resolver::new(vec![a, b], "a").unwrap();

        resolver.save_service(&svc("google"), &length(8), None).await.unwrap();
        assert!(b_source.load("services/google").await.unwrap().is_none());

        assert_eq!(resolver.resolve(&svc("google"), None).await.unwrap().settings.length, Some(8));
        let after_first = counting.loads.load(Ordering::SeqCst);
        resolver.resolve(&svc("google"), None).await.unwrap();
        assert_eq!(counting.loads.load(Ordering::SeqCst), after_first);

        resolver.save_service(&svc("google"), &length(9), None).await.unwrap();
        assert_eq!(resolver.resolve(&svc("google"), None).await.unwrap().settings.length, Some(9));
        assert!(counting.loads.load(Ordering::SeqCst) > after_first);

        resolver.delete_service(&svc("google"), None).await.unwrap();
        assert_eq!(resolver.resolve(&svc("google"), None).await.unwrap().settings.length, None);
    }

    /// Answers the first service load with what the store held at the time,
    /// then stalls before returning it.
    struct StallingSource {
        inner: MemorySource,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl Source for StallingSource {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let value = self.inner.load(key).await?;
            if key.starts_with("services/") && !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(value)
        }
        async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
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
        fn kind(&self) -> SourceKind {
            SourceKind::Memory
        }
    }

    #[tokio::test]
    async fn test_read_racing_a_write_does_not_cache_stale_record() {
        let c = cipher();
        let stalling = Arc::new(StallingSource {
            inner: MemorySource::new("a"),
            stalled: AtomicBool::new(false),
        });
        let resolver = Resolver::new(vec![SettingsStore::new(stalling, c.clone())], "a").unwrap();
        let google = svc("google");

        let read = resolver.resolve(&google, None);
        let write = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resolver.save_service(&google, &length(8), None).await.unwrap();
        };
        let (stale, ()) = tokio::join!(read, write);
        assert_eq!(stale.unwrap().settings.length, None);

        assert_eq!(resolver.resolve(&google, None).await.unwrap().settings.length, Some(8));
    }

    #[tokio::test]
    async fn test_pinned_import_export() {
        let c = cipher();
        let resolver = Resolver::new(vec![memory("a", &c), memory("b", &c)], "a").unwrap();
        let mut record = SettingsRecord::default();
        record.services.insert(svc("google"), length(14));

        resolver.import(&record, Some("b")).await.unwrap();
        assert_eq!(resolver.export(Some("b")).await.unwrap(), record);
        assert!(resolver.export(None).await.unwrap().services.is_empty());

        resolver.clear(Some("b")).await.unwrap();
        assert!(resolver.list(None).await.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_default_and_duplicates_rejected() {
        let c = cipher();
        assert!(Resolver::new(vec![memory("a", &c)], "b").is_err());
        assert!(Resolver::new(vec![memory("a", &c), memory("a", &c)], "a").is_err());
    }

    #[test]
    fn test_from_config_adds_implied_local_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = HashpassConfig {
            store_path: dir.path().join("store"),
            cipher_work: 10,
            ..Default::default()
        };
        let resolver = Resolver::from_config(&config, "p").unwrap();
        assert_eq!(resolver.default_source(), "local");
        assert_eq!(resolver.source_names(), vec!["local"]);
    }
}
