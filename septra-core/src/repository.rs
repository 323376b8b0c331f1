use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Every collection the engine persists. Each one is read and written whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Skus,
    Demands,
    GroupOrders,
    Rfqs,
    Bids,
    PharmacyOrders,
    SupplierOrders,
    Escrows,
    Logistics,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Skus,
        Collection::Demands,
        Collection::GroupOrders,
        Collection::Rfqs,
        Collection::Bids,
        Collection::PharmacyOrders,
        Collection::SupplierOrders,
        Collection::Escrows,
        Collection::Logistics,
    ];

    /// Stable storage key, also used as the JSON file stem.
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Skus => "skus",
            Collection::Demands => "demands",
            Collection::GroupOrders => "group_orders",
            Collection::Rfqs => "rfqs",
            Collection::Bids => "bids",
            Collection::PharmacyOrders => "pharmacy_orders",
            Collection::SupplierOrders => "supplier_orders",
            Collection::Escrows => "escrows",
            Collection::Logistics => "logistics",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Full contents of one collection plus the version it was read at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSnapshot {
    pub records: Vec<Value>,
    pub version: u64,
}

/// Replacement contents for one collection, valid only if the stored version
/// still equals `expected_version`.
#[derive(Debug, Clone)]
pub struct CollectionWrite {
    pub collection: Collection,
    pub expected_version: u64,
    pub records: Vec<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Stale write to {collection}: expected version {expected}, found {actual}")]
    Conflict {
        collection: Collection,
        expected: u64,
        actual: u64,
    },

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt collection {collection}: {reason}")]
    Corrupt { collection: Collection, reason: String },
}

/// Get-all / replace-all record store. No partial updates and no queries:
/// callers read a whole collection, compute the next one and write it back.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_all(&self, collection: Collection) -> Result<CollectionSnapshot, StoreError>;

    /// Apply every write or none of them.
    async fn replace_all(&self, writes: Vec<CollectionWrite>) -> Result<(), StoreError>;
}

/// A typed row of a collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    const COLLECTION: Collection;
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;
}
