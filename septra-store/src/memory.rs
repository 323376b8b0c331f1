use async_trait::async_trait;
use septra_core::repository::{Collection, CollectionSnapshot, CollectionWrite, EntityStore, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process store. Versions start at zero for collections never written.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, CollectionSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Check every expected version before touching anything.
pub(crate) fn check_versions(
    current: &HashMap<Collection, CollectionSnapshot>,
    writes: &[CollectionWrite],
) -> Result<(), StoreError> {
    for write in writes {
        let actual = current.get(&write.collection).map(|s| s.version).unwrap_or(0);
        if actual != write.expected_version {
            return Err(StoreError::Conflict {
                collection: write.collection,
                expected: write.expected_version,
                actual,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_all(&self, collection: Collection) -> Result<CollectionSnapshot, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).cloned().unwrap_or_default())
    }

    async fn replace_all(&self, writes: Vec<CollectionWrite>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        check_versions(&collections, &writes)?;
        for write in writes {
            let entry = collections.entry(write.collection).or_default();
            entry.version += 1;
            entry.records = write.records;
        }
        Ok(())
    }
}
