use crate::escrow::ensure_funded;
use crate::lifecycle::refresh_group_order;
use crate::logistics::ensure_legs_for_pharmacy;
use crate::models::PharmacyOrder;
use crate::status::{LineStatus, PaymentTerms, PharmacyOrderEvent, PharmacyOrderStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use septra_shared::pii::Masked;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub payment_terms: PaymentTerms,
    pub delivery_address: String,
}

/// Accept the order's pending lines.
///
/// A pending order becomes confirmed. A confirmed order that picked up lines
/// from a later award can be confirmed again to accept just those lines.
/// Either way the escrow is funded to the confirmed total.
pub async fn confirm_pharmacy_order(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order_id: Uuid,
    confirmation: Confirmation,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<PharmacyOrder> {
    let mut order = tx.find::<PharmacyOrder>(order_id).await?;
    if confirmation.delivery_address.trim().is_empty() {
        return Err(ProcurementError::Validation("delivery address is required".to_string()));
    }

    match order.status.on(PharmacyOrderEvent::Confirm) {
        Some(next) => {
            order.status = next;
            order.confirmed_at = Some(now);
        }
        None if order.status == PharmacyOrderStatus::Confirmed && order.has_pending_lines() => {}
        None => {
            return Err(ProcurementError::transition(
                "PharmacyOrder",
                order.id,
                order.status,
                PharmacyOrderStatus::Confirmed,
            ))
        }
    }

    for line in order.lines.iter_mut().filter(|l| l.status == LineStatus::Pending) {
        line.status = LineStatus::Confirmed;
    }
    order.payment_terms = Some(confirmation.payment_terms);
    order.delivery_address = Some(Masked::new(confirmation.delivery_address.trim().to_string()));
    order.touch(now);
    tx.put(&order).await?;

    info!("Pharmacy {} confirmed order {}", order.pharmacy_id, order.id);
    events.push(DomainEvent::PharmacyOrderConfirmed {
        order_id: order.id,
        rfq_id: order.rfq_id,
        pharmacy_id: order.pharmacy_id.clone(),
        total_value: order.confirmed_value(),
    });

    ensure_funded(tx, now, &order, events).await?;
    ensure_legs_for_pharmacy(tx, now, &order, events).await?;
    refresh_group_order(tx, now, order.rfq_id, events).await?;
    Ok(order)
}

/// Turn down the order's pending lines. No escrow is touched.
pub async fn decline_pharmacy_order(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order_id: Uuid,
    reason: Option<String>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<PharmacyOrder> {
    let mut order = tx.find::<PharmacyOrder>(order_id).await?;

    match order.status.on(PharmacyOrderEvent::Decline) {
        Some(next) => {
            order.status = next;
            order.declined_at = Some(now);
            order.decline_reason = reason;
        }
        None if order.status == PharmacyOrderStatus::Confirmed && order.has_pending_lines() => {}
        None => {
            return Err(ProcurementError::transition(
                "PharmacyOrder",
                order.id,
                order.status,
                PharmacyOrderStatus::Declined,
            ))
        }
    }

    for line in order.lines.iter_mut().filter(|l| l.status == LineStatus::Pending) {
        line.status = LineStatus::Declined;
    }
    order.touch(now);
    tx.put(&order).await?;

    info!("Pharmacy {} declined order {}", order.pharmacy_id, order.id);
    events.push(DomainEvent::PharmacyOrderDeclined {
        order_id: order.id,
        rfq_id: order.rfq_id,
        pharmacy_id: order.pharmacy_id.clone(),
    });

    refresh_group_order(tx, now, order.rfq_id, events).await?;
    Ok(order)
}
