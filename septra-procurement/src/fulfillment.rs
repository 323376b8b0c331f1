use crate::lifecycle::refresh_group_order;
use crate::logistics::sync_legs_for_supplier;
use crate::models::SupplierOrder;
use crate::status::SupplierOrderStatus;
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use tracing::info;
use uuid::Uuid;

/// Extra data a supplier can attach to a status change. Tracking number and
/// expected delivery are mandatory for `shipped`.
#[derive(Debug, Clone, Default)]
pub struct ShipmentDetails {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Move a supplier order exactly one step forward.
pub async fn advance_supplier_order(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order_id: Uuid,
    target: SupplierOrderStatus,
    details: ShipmentDetails,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<SupplierOrder> {
    let mut order = tx.find::<SupplierOrder>(order_id).await?;
    if order.status.next() != Some(target) {
        return Err(ProcurementError::transition("SupplierOrder", order.id, order.status, target));
    }

    match target {
        SupplierOrderStatus::Shipped => {
            let tracking = details
                .tracking_number
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ProcurementError::Validation("tracking number is required to ship".to_string()))?;
            let expected = details.expected_delivery.ok_or_else(|| {
                ProcurementError::Validation("expected delivery is required to ship".to_string())
            })?;
            order.tracking_number = Some(tracking);
            order.carrier = details.carrier;
            order.expected_delivery = Some(expected);
            order.shipped_at = Some(now);
        }
        SupplierOrderStatus::Delivered => order.delivered_at = Some(now),
        SupplierOrderStatus::Invoiced => order.invoiced_at = Some(now),
        SupplierOrderStatus::Assigned | SupplierOrderStatus::InFulfillment => {}
    }
    if details.notes.is_some() {
        order.notes = details.notes;
    }

    let previous = order.status;
    order.status = target;
    order.touch(now);
    tx.put(&order).await?;

    info!("Supplier order {} {} -> {}", order.id, previous, target);
    events.push(DomainEvent::SupplierOrderAdvanced {
        order_id: order.id,
        rfq_id: order.rfq_id,
        supplier_id: order.supplier_id.clone(),
        from: previous.to_string(),
        to: target.to_string(),
    });

    sync_legs_for_supplier(tx, now, &order, events).await?;
    refresh_group_order(tx, now, order.rfq_id, events).await?;
    Ok(order)
}
