//! In-process source for tests and ephemeral sessions.

use async_trait::async_trait;
use hashpass_types::{Result, Source, SourceKind};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// A [`Source`] that keeps blobs in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter_map(|k| k.strip_prefix(prefix))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_listing() {
        let source = MemorySource::new("mem");
        source.dump("global", b"g").await.unwrap();
        source.dump("services/a", b"a").await.unwrap();
        source.dump("services/b/c", b"bc").await.unwrap();

        assert_eq!(source.list("services/").await.unwrap(), vec!["a", "b/c"]);
        assert_eq!(source.len().await, 3);

        source.remove("services/a").await.unwrap();
        source.remove("services/missing").await.unwrap();
        assert_eq!(source.load("services/a").await.unwrap(), None);
        assert_eq!(source.kind(), SourceKind::Memory);
    }
}
