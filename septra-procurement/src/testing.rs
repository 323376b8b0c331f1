use septra_catalog::{catalog, NewSku};
use septra_core::repository::EntityStore;
use septra_core::transaction::Transaction;
use septra_store::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

pub fn store() -> Arc<dyn EntityStore> {
    Arc::new(MemoryStore::new())
}

pub async fn seed_sku(store: &Arc<dyn EntityStore>, code: &str) -> Uuid {
    let mut tx = Transaction::begin(store.clone());
    let input = NewSku {
        code: code.to_string(),
        name: format!("{} tablets", code),
        category: "analgesics".to_string(),
        unit: "box".to_string(),
        ..Default::default()
    };
    let sku = catalog::create_sku(&mut tx, input, "admin", chrono::Utc::now())
        .await
        .unwrap();
    tx.commit().await.unwrap();
    sku.id
}
