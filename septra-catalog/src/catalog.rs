use crate::sku::{NewSku, Sku, SkuUpdate};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use tracing::info;
use uuid::Uuid;

/// Add a product. Codes are unique regardless of case.
pub async fn create_sku(
    tx: &mut Transaction,
    input: NewSku,
    created_by: &str,
    now: DateTime<Utc>,
) -> ProcurementResult<Sku> {
    input.validate()?;
    let mut skus = tx.fetch::<Sku>().await?;
    let code = input.code.trim();
    if skus.iter().any(|s| s.code.eq_ignore_ascii_case(code)) {
        return Err(ProcurementError::Validation(format!(
            "SKU code {} already exists",
            code.to_uppercase()
        )));
    }

    let sku = Sku::new(input, created_by.to_string(), now);
    skus.push(sku.clone());
    tx.stage(&skus).await?;
    info!("Created SKU {} ({})", sku.code, sku.id);
    Ok(sku)
}

pub async fn update_sku(
    tx: &mut Transaction,
    sku_id: Uuid,
    update: SkuUpdate,
    now: DateTime<Utc>,
) -> ProcurementResult<Sku> {
    let mut sku = tx.find::<Sku>(sku_id).await?;
    sku.apply(update, now)?;
    tx.put(&sku).await?;
    Ok(sku)
}

pub async fn set_sku_active(
    tx: &mut Transaction,
    sku_id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> ProcurementResult<Sku> {
    let mut sku = tx.find::<Sku>(sku_id).await?;
    if sku.is_active != active {
        sku.is_active = active;
        sku.touch(now);
        tx.put(&sku).await?;
        info!("SKU {} active={}", sku.code, active);
    }
    Ok(sku)
}

/// Remove a product outright. Callers check that nothing pending still
/// points at it.
pub async fn delete_sku(tx: &mut Transaction, sku_id: Uuid) -> ProcurementResult<Sku> {
    let mut skus = tx.fetch::<Sku>().await?;
    let position = skus
        .iter()
        .position(|s| s.id == sku_id)
        .ok_or_else(|| ProcurementError::not_found("SKU", sku_id))?;
    let removed = skus.remove(position);
    tx.stage(&skus).await?;
    info!("Deleted SKU {}", removed.code);
    Ok(removed)
}

pub async fn list_skus(tx: &mut Transaction, active_only: bool) -> ProcurementResult<Vec<Sku>> {
    let mut skus: Vec<Sku> = tx
        .fetch::<Sku>()
        .await?
        .into_iter()
        .filter(|s| !active_only || s.is_active)
        .collect();
    skus.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(skus)
}

/// An SKU that demand may reference: it must exist and be active.
pub async fn orderable_sku(tx: &mut Transaction, sku_id: Uuid) -> ProcurementResult<Sku> {
    let sku = tx.find::<Sku>(sku_id).await?;
    if !sku.is_active {
        return Err(ProcurementError::Validation(format!(
            "SKU {} is inactive",
            sku.code
        )));
    }
    Ok(sku)
}

#[cfg(test)]
mod tests {
    use super::*;
    use septra_store::MemoryStore;
    use std::sync::Arc;

    fn input(code: &str) -> NewSku {
        NewSku {
            code: code.to_string(),
            name: format!("{} tablets", code),
            category: "analgesics".to_string(),
            unit: "box".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_catalog_crud() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let mut tx = Transaction::begin(store.clone());
        let para = create_sku(&mut tx, input("PARA500"), "admin", now).await.unwrap();
        let ibu = create_sku(&mut tx, input("IBU200"), "admin", now).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(store.clone());
        set_sku_active(&mut tx, ibu.id, false, now).await.unwrap();
        let active = list_skus(&mut tx, true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, para.id);
        assert_eq!(list_skus(&mut tx, false).await.unwrap().len(), 2);

        let err = orderable_sku(&mut tx, ibu.id).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));

        delete_sku(&mut tx, ibu.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(store);
        assert_eq!(list_skus(&mut tx, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut tx = Transaction::begin(store);
        create_sku(&mut tx, input("PARA500"), "admin", Utc::now()).await.unwrap();
        let err = create_sku(&mut tx, input("para500"), "admin", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));
    }
}
