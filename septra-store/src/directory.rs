use async_trait::async_trait;
use septra_core::supplier::SupplierDirectory;
use std::collections::HashMap;

/// Supplier ratings known up front, usually from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSupplierDirectory {
    ratings: HashMap<String, f64>,
}

impl StaticSupplierDirectory {
    pub fn new(ratings: HashMap<String, f64>) -> Self {
        Self { ratings }
    }

    pub fn with_rating(mut self, supplier_id: impl Into<String>, rating: f64) -> Self {
        self.ratings.insert(supplier_id.into(), rating);
        self
    }
}

#[async_trait]
impl SupplierDirectory for StaticSupplierDirectory {
    async fn rating(&self, supplier_id: &str) -> Option<f64> {
        self.ratings.get(supplier_id).copied()
    }
}
