use crate::bidding::{group_order_mut, reject_bids, status_changed};
use crate::models::{Bid, Escrow, GroupOrder, PharmacyOrder, Rfq, SupplierOrder};
use crate::status::{GroupOrderStatus, PharmacyOrderStatus, RfqEvent, SupplierOrderStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use tracing::info;
use uuid::Uuid;

/// Where the group order behind `rfq_id` should be, given its derived records.
fn target_status(
    current: GroupOrderStatus,
    pharmacy_orders: &[PharmacyOrder],
    supplier_orders: &[SupplierOrder],
    escrows: &[Escrow],
) -> GroupOrderStatus {
    let mut target = current;
    if pharmacy_orders.is_empty() {
        return target;
    }
    target = target.max(GroupOrderStatus::AwaitingConfirmations);

    // Declined orders drop out; everyone else has to confirm
    let settled = pharmacy_orders.iter().all(PharmacyOrder::is_settled);
    let confirmed: Vec<&PharmacyOrder> = pharmacy_orders
        .iter()
        .filter(|o| o.status == PharmacyOrderStatus::Confirmed)
        .collect();
    if !settled || confirmed.is_empty() {
        return target;
    }
    target = target.max(GroupOrderStatus::Scheduled);

    if supplier_orders.iter().any(|s| s.status >= SupplierOrderStatus::Shipped) {
        target = target.max(GroupOrderStatus::InDelivery);
    }

    let escrows_settled = confirmed.iter().all(|o| {
        escrows
            .iter()
            .any(|e| e.pharmacy_order_id == o.id && e.status.is_terminal())
    });
    if escrows_settled {
        target = GroupOrderStatus::Completed;
    }
    target
}

/// Re-derive the group order's status from its pharmacy orders, supplier
/// orders and escrows. Only ever moves it forward.
pub async fn refresh_group_order(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    rfq_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<GroupOrder> {
    let rfq = tx.find::<Rfq>(rfq_id).await?;
    let pharmacy_orders: Vec<PharmacyOrder> = tx
        .fetch::<PharmacyOrder>()
        .await?
        .into_iter()
        .filter(|o| o.rfq_id == rfq_id)
        .collect();
    let supplier_orders: Vec<SupplierOrder> = tx
        .fetch::<SupplierOrder>()
        .await?
        .into_iter()
        .filter(|o| o.rfq_id == rfq_id)
        .collect();
    let escrows: Vec<Escrow> = tx
        .fetch::<Escrow>()
        .await?
        .into_iter()
        .filter(|e| e.rfq_id == rfq_id)
        .collect();

    let (mut group_orders, index) = group_order_mut(tx, rfq.group_order_id).await?;
    let group_order = &mut group_orders[index];
    if group_order.status.is_terminal() {
        return Ok(group_order.clone());
    }

    let target = target_status(group_order.status, &pharmacy_orders, &supplier_orders, &escrows);
    let previous = group_order.promote(target, now);
    if previous.is_none() {
        return Ok(group_order.clone());
    }
    status_changed(events, group_order, previous);
    let refreshed = group_order.clone();
    tx.stage(&group_orders).await?;
    Ok(refreshed)
}

/// Abandon a group order before anything is awarded. Closes its RFQ and
/// turns down the bids already in.
pub async fn cancel_group_order(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    group_order_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<GroupOrder> {
    let (mut group_orders, index) = group_order_mut(tx, group_order_id).await?;
    let group_order = &mut group_orders[index];
    if !group_order.status.can_cancel() || group_order.lines.iter().any(|l| l.award.is_some()) {
        return Err(ProcurementError::transition(
            "GroupOrder",
            group_order.id,
            group_order.status,
            GroupOrderStatus::Cancelled,
        ));
    }

    let mut rfqs = tx.fetch::<Rfq>().await?;
    let mut closed = Vec::new();
    for rfq in rfqs.iter_mut().filter(|r| r.group_order_id == group_order_id) {
        if let Some(next) = rfq.status.on(RfqEvent::Close) {
            rfq.status = next;
            rfq.closed_at = Some(now);
            rfq.touch(now);
            closed.push(rfq.id);
        }
    }
    if !closed.is_empty() {
        tx.stage(&rfqs).await?;
        let mut bids = tx.fetch::<Bid>().await?;
        reject_bids(&mut bids, now, events, |b| closed.contains(&b.rfq_id));
        tx.stage(&bids).await?;
    }

    let previous = group_order.status;
    group_order.status = GroupOrderStatus::Cancelled;
    group_order.touch(now);
    status_changed(events, group_order, Some(previous));
    let cancelled = group_order.clone();
    tx.stage(&group_orders).await?;

    info!("Cancelled group order {}", group_order_id);
    Ok(cancelled)
}
