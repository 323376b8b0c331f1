use async_trait::async_trait;

/// Lookup of supplier reputation, used as the last tie-break when ranking bids.
#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    /// Rating in the 0.0..=5.0 range, `None` for unknown suppliers.
    async fn rating(&self, supplier_id: &str) -> Option<f64>;
}
