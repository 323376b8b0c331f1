use crate::repository::{Collection, CollectionWrite, EntityStore, Record, StoreError};
use crate::{ProcurementError, ProcurementResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

struct Staged {
    version: u64,
    original: Vec<Value>,
    current: Vec<Value>,
}

/// Unit of work over an [`EntityStore`].
///
/// Collections are read at most once; later fetches see whatever was staged
/// since. Nothing reaches the store until [`Transaction::commit`], which
/// writes all changed collections in a single version-checked batch. Dropping
/// a transaction discards its changes.
pub struct Transaction {
    store: Arc<dyn EntityStore>,
    staged: BTreeMap<Collection, Staged>,
}

impl Transaction {
    pub fn begin(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
        }
    }

    async fn load(&mut self, collection: Collection) -> ProcurementResult<&Staged> {
        if !self.staged.contains_key(&collection) {
            let snapshot = self.store.get_all(collection).await?;
            self.staged.insert(
                collection,
                Staged {
                    version: snapshot.version,
                    current: snapshot.records.clone(),
                    original: snapshot.records,
                },
            );
        }
        self.staged
            .get(&collection)
            .ok_or_else(|| ProcurementError::Consistency(format!("{} not loaded", collection)))
    }

    /// All rows of `T`'s collection as currently staged.
    pub async fn fetch<T: Record>(&mut self) -> ProcurementResult<Vec<T>> {
        let staged = self.load(T::COLLECTION).await?;
        staged
            .current
            .iter()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    ProcurementError::Store(StoreError::Corrupt {
                        collection: T::COLLECTION,
                        reason: e.to_string(),
                    })
                })
            })
            .collect()
    }

    pub async fn find<T: Record>(&mut self, id: Uuid) -> ProcurementResult<T> {
        self.fetch::<T>()
            .await?
            .into_iter()
            .find(|row| row.id() == id)
            .ok_or_else(|| ProcurementError::not_found(T::ENTITY, id))
    }

    /// Replace the staged contents of `T`'s collection.
    pub async fn stage<T: Record>(&mut self, rows: &[T]) -> ProcurementResult<()> {
        self.load(T::COLLECTION).await?;
        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        if let Some(staged) = self.staged.get_mut(&T::COLLECTION) {
            staged.current = values;
        }
        Ok(())
    }

    /// Insert or replace a single row by id.
    pub async fn put<T: Record>(&mut self, row: &T) -> ProcurementResult<()> {
        let mut rows = self.fetch::<T>().await?;
        match rows.iter_mut().find(|existing| existing.id() == row.id()) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        self.stage(&rows).await
    }

    pub fn is_dirty(&self) -> bool {
        self.staged.values().any(|s| s.current != s.original)
    }

    /// Write every changed collection atomically. Returns the collections written.
    pub async fn commit(self) -> ProcurementResult<Vec<Collection>> {
        let writes: Vec<CollectionWrite> = self
            .staged
            .into_iter()
            .filter(|(_, staged)| staged.current != staged.original)
            .map(|(collection, staged)| CollectionWrite {
                collection,
                expected_version: staged.version,
                records: staged.current,
            })
            .collect();

        let written: Vec<Collection> = writes.iter().map(|w| w.collection).collect();
        if writes.is_empty() {
            return Ok(written);
        }
        self.store.replace_all(writes).await?;
        debug!("Committed collections {:?}", written);
        Ok(written)
    }
}
