use crate::bidding::{group_order_mut, reject_bids, status_changed};
use crate::fanout::{generate_pharmacy_orders, generate_supplier_orders};
use crate::models::{Bid, LineAward, Rfq};
use crate::status::{BidEvent, BidStatus, GroupOrderStatus, RfqEvent, RfqStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use tracing::info;
use uuid::Uuid;

/// Pick `bid_id` as the winner of its line, reject its rivals and fan out
/// whatever is now awarded.
pub async fn award_bid(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    bid_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Bid> {
    let mut bids = tx.fetch::<Bid>().await?;
    let position = bids
        .iter()
        .position(|b| b.id == bid_id)
        .ok_or_else(|| ProcurementError::not_found("Bid", bid_id))?;
    let bid = bids[position].clone();

    match bid.status {
        BidStatus::Submitted => {}
        BidStatus::Awarded => {
            return Err(ProcurementError::AlreadyAwarded { bid_id: bid.id.to_string() })
        }
        BidStatus::Rejected => {
            return Err(ProcurementError::transition("Bid", bid.id, bid.status, BidStatus::Awarded))
        }
    }

    let mut rfq = tx.find::<Rfq>(bid.rfq_id).await?;
    let next_rfq = rfq
        .status
        .on(RfqEvent::Award)
        .ok_or_else(|| ProcurementError::transition("RFQ", rfq.id, rfq.status, RfqStatus::Awarded))?;

    let (mut group_orders, index) = group_order_mut(tx, rfq.group_order_id).await?;
    let group_order = &mut group_orders[index];
    if group_order.status.is_terminal() {
        return Err(ProcurementError::transition(
            "GroupOrder",
            group_order.id,
            group_order.status,
            GroupOrderStatus::Awarded,
        ));
    }
    // Bids left on a superseded RFQ cannot win
    if group_order.active_rfq_id != Some(rfq.id) {
        return Err(ProcurementError::transition("RFQ", rfq.id, "superseded", RfqStatus::Awarded));
    }
    let line = group_order
        .lines
        .iter_mut()
        .find(|l| l.sku_id == bid.sku_id)
        .ok_or_else(|| {
            ProcurementError::Consistency(format!(
                "bid {} targets SKU {} missing from group order {}",
                bid.id, bid.sku_id, rfq.group_order_id
            ))
        })?;
    if let Some(existing) = &line.award {
        return Err(ProcurementError::AlreadyAwarded { bid_id: existing.bid_id.to_string() });
    }

    let award = LineAward {
        rfq_id: rfq.id,
        bid_id: bid.id,
        supplier_id: bid.supplier_id.clone(),
        unit_price: bid.unit_price,
        quantity: bid.quantity.min(line.total_quantity),
        awarded_at: now,
    };
    let awarded_quantity = award.quantity;
    line.award = Some(award);
    group_order.recompute_total();
    group_order.touch(now);
    let previous = group_order.promote(GroupOrderStatus::Awarded, now);
    status_changed(events, group_order, previous);

    let winner = &mut bids[position];
    winner.status = winner
        .status
        .on(BidEvent::Award)
        .ok_or_else(|| ProcurementError::transition("Bid", bid.id, bid.status, BidStatus::Awarded))?;
    winner.touch(now);
    reject_bids(&mut bids, now, events, |b| {
        b.rfq_id == bid.rfq_id && b.sku_id == bid.sku_id && b.id != bid.id
    });

    let winners = bids
        .iter()
        .filter(|b| b.rfq_id == bid.rfq_id && b.sku_id == bid.sku_id && b.status == BidStatus::Awarded)
        .count();
    if winners != 1 {
        return Err(ProcurementError::Consistency(format!(
            "{} awarded bids for RFQ {} SKU {}",
            winners, bid.rfq_id, bid.sku_id
        )));
    }

    rfq.status = next_rfq;
    if let Some(rfq_line) = rfq.lines.iter_mut().find(|l| l.sku_id == bid.sku_id) {
        rfq_line.awarded_bid_id = Some(bid.id);
    }
    rfq.touch(now);

    tx.stage(&bids).await?;
    tx.put(&rfq).await?;
    tx.stage(&group_orders).await?;

    info!(
        "Awarded bid {} ({} x {} from {}) on RFQ {}",
        bid.id, awarded_quantity, bid.unit_price, bid.supplier_id, bid.rfq_id
    );
    events.push(DomainEvent::BidAwarded {
        bid_id: bid.id,
        rfq_id: bid.rfq_id,
        supplier_id: bid.supplier_id.clone(),
        sku_id: bid.sku_id,
        awarded_price: bid.unit_price,
        awarded_quantity,
    });

    generate_pharmacy_orders(tx, now, bid.rfq_id, events).await?;
    generate_supplier_orders(tx, now, bid.rfq_id, events).await?;

    tx.find::<Bid>(bid.id).await
}
