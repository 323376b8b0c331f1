use crate::models::{Bid, GroupOrder, Rfq, RfqLine};
use crate::status::{BidEvent, BidStatus, GroupOrderStatus, RfqEvent, RfqStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use septra_catalog::Sku;
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct RfqFields {
    pub title: String,
    pub description: Option<String>,
    /// Falls back to the group order's bidding deadline.
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub delivery_requirement: Option<String>,
    pub terms: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBid {
    pub rfq_id: Uuid,
    pub supplier_id: String,
    pub sku_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub lead_time_days: u32,
    pub min_quantity: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedBid {
    pub rank: usize,
    pub bid: Bid,
    pub supplier_rating: Option<f64>,
}

pub(crate) async fn group_order_mut(
    tx: &mut Transaction,
    group_order_id: Uuid,
) -> ProcurementResult<(Vec<GroupOrder>, usize)> {
    let orders = tx.fetch::<GroupOrder>().await?;
    let index = orders
        .iter()
        .position(|g| g.id == group_order_id)
        .ok_or_else(|| ProcurementError::not_found("GroupOrder", group_order_id))?;
    Ok((orders, index))
}

pub(crate) fn status_changed(
    events: &mut Vec<DomainEvent>,
    group_order: &GroupOrder,
    previous: Option<GroupOrderStatus>,
) {
    if let Some(from) = previous {
        info!("Group order {} {} -> {}", group_order.id, from, group_order.status);
        events.push(DomainEvent::GroupOrderStatusChanged {
            group_order_id: group_order.id,
            from: from.to_string(),
            to: group_order.status.to_string(),
        });
    }
}

/// Put a group order out to bid.
pub async fn publish_rfq(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    group_order_id: Uuid,
    fields: RfqFields,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Rfq> {
    let (mut group_orders, index) = group_order_mut(tx, group_order_id).await?;
    let group_order = &mut group_orders[index];

    if group_order.status.is_terminal() || group_order.status > GroupOrderStatus::BiddingClosed {
        return Err(ProcurementError::transition(
            "GroupOrder",
            group_order.id,
            group_order.status,
            GroupOrderStatus::RfqOpen,
        ));
    }
    let mut rfqs = tx.fetch::<Rfq>().await?;
    if let Some(active) = rfqs
        .iter()
        .find(|r| r.group_order_id == group_order_id && r.status.is_active())
    {
        return Err(ProcurementError::transition("RFQ", active.id, active.status, "superseded"));
    }

    if fields.title.trim().is_empty() {
        return Err(ProcurementError::Validation("RFQ title is required".to_string()));
    }
    let deadline = fields
        .bidding_deadline
        .or(group_order.bidding_deadline)
        .ok_or_else(|| ProcurementError::Validation("bidding deadline is required".to_string()))?;
    if deadline <= now {
        return Err(ProcurementError::Validation(format!(
            "bidding deadline {} is not in the future",
            deadline.to_rfc3339()
        )));
    }
    if group_order.lines.is_empty() {
        return Err(ProcurementError::Validation("group order has no lines".to_string()));
    }
    group_order.check_breakdowns()?;

    let rfq = Rfq {
        id: Uuid::new_v4(),
        group_order_id,
        title: fields.title.trim().to_string(),
        description: fields.description.or_else(|| group_order.description.clone()),
        terms: fields.terms,
        delivery_requirement: fields.delivery_requirement,
        bidding_deadline: deadline,
        lines: group_order
            .lines
            .iter()
            .map(|l| RfqLine {
                sku_id: l.sku_id,
                total_quantity: l.total_quantity,
                demand_breakdown: l.demand_breakdown.clone(),
                awarded_bid_id: None,
            })
            .collect(),
        status: RfqStatus::Open,
        closed_at: None,
        revision: 0,
        created_at: now,
        updated_at: now,
    };

    group_order.active_rfq_id = Some(rfq.id);
    group_order.touch(now);
    let previous = group_order.promote(GroupOrderStatus::RfqOpen, now);
    status_changed(events, group_order, previous);

    let superseded: Vec<Uuid> = rfqs
        .iter()
        .filter(|r| r.group_order_id == group_order_id)
        .map(|r| r.id)
        .collect();
    if !superseded.is_empty() {
        let mut bids = tx.fetch::<Bid>().await?;
        reject_bids(&mut bids, now, events, |b| superseded.contains(&b.rfq_id));
        tx.stage(&bids).await?;
        info!("Rejected open bids on {} superseded RFQ(s) of group order {}", superseded.len(), group_order_id);
    }

    rfqs.push(rfq.clone());
    tx.stage(&rfqs).await?;
    tx.stage(&group_orders).await?;

    info!("Published RFQ {} for group order {}", rfq.id, group_order_id);
    events.push(DomainEvent::RfqPublished {
        rfq_id: rfq.id,
        group_order_id,
        title: rfq.title.clone(),
        bidding_deadline: deadline,
    });
    Ok(rfq)
}

pub async fn submit_bid(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    input: NewBid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Bid> {
    let rfq = tx.find::<Rfq>(input.rfq_id).await?;
    if rfq.status != RfqStatus::Open {
        return Err(ProcurementError::transition("RFQ", rfq.id, rfq.status, "bid"));
    }
    if now >= rfq.bidding_deadline {
        warn!("Late bid from {} on RFQ {}", input.supplier_id, rfq.id);
        return Err(ProcurementError::DeadlinePassed {
            rfq_id: rfq.id.to_string(),
            deadline: rfq.bidding_deadline,
        });
    }

    let line = rfq
        .line(input.sku_id)
        .ok_or_else(|| ProcurementError::not_found("RFQ line", input.sku_id))?;
    if input.supplier_id.trim().is_empty() {
        return Err(ProcurementError::Validation("supplier id is required".to_string()));
    }
    if input.unit_price <= Decimal::ZERO {
        return Err(ProcurementError::Validation("unit price must be positive".to_string()));
    }
    if input.quantity == 0 || input.quantity > line.total_quantity {
        return Err(ProcurementError::Validation(format!(
            "bid quantity {} must be between 1 and {}",
            input.quantity, line.total_quantity
        )));
    }
    if let Some(min) = input.min_quantity {
        if min > line.total_quantity || min > input.quantity {
            return Err(ProcurementError::Validation(format!(
                "minimum quantity {} exceeds bid quantity {} or line total {}",
                min, input.quantity, line.total_quantity
            )));
        }
    }

    let bid = Bid {
        id: Uuid::new_v4(),
        rfq_id: rfq.id,
        supplier_id: input.supplier_id,
        sku_id: input.sku_id,
        unit_price: input.unit_price,
        quantity: input.quantity,
        min_quantity: input.min_quantity,
        lead_time_days: input.lead_time_days,
        notes: input.notes,
        status: BidStatus::Submitted,
        revision: 0,
        created_at: now,
        updated_at: now,
    };
    tx.put(&bid).await?;

    events.push(DomainEvent::BidSubmitted {
        bid_id: bid.id,
        rfq_id: bid.rfq_id,
        supplier_id: bid.supplier_id.clone(),
        sku_id: bid.sku_id,
        unit_price: bid.unit_price,
        quantity: bid.quantity,
    });
    Ok(bid)
}

/// Stop accepting bids. Closing a closed (or awarded) RFQ changes nothing.
pub async fn close_bidding(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    rfq_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Rfq> {
    let mut rfq = tx.find::<Rfq>(rfq_id).await?;
    let Some(next) = rfq.status.on(RfqEvent::Close) else {
        return Ok(rfq);
    };
    rfq.status = next;
    rfq.closed_at = Some(now);
    rfq.touch(now);
    tx.put(&rfq).await?;

    let (mut group_orders, index) = group_order_mut(tx, rfq.group_order_id).await?;
    let previous = group_orders[index].promote(GroupOrderStatus::BiddingClosed, now);
    status_changed(events, &group_orders[index], previous);
    tx.stage(&group_orders).await?;

    let bid_count = tx
        .fetch::<Bid>()
        .await?
        .iter()
        .filter(|b| b.rfq_id == rfq_id)
        .count();
    info!("Closed bidding on RFQ {} with {} bids", rfq_id, bid_count);
    events.push(DomainEvent::BiddingClosed { rfq_id, bid_count });
    Ok(rfq)
}

/// Reject every still-submitted bid matching `filter`.
pub(crate) fn reject_bids(
    bids: &mut [Bid],
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
    filter: impl Fn(&Bid) -> bool,
) {
    for bid in bids.iter_mut().filter(|b| filter(b)) {
        if let Some(next) = bid.status.on(BidEvent::Reject) {
            bid.status = next;
            bid.touch(now);
            events.push(DomainEvent::BidRejected {
                bid_id: bid.id,
                rfq_id: bid.rfq_id,
                supplier_id: bid.supplier_id.clone(),
                sku_id: bid.sku_id,
            });
        }
    }
}

/// Advisory ordering: cheapest first, then fastest, then best rated.
/// Only submitted bids take part.
pub fn rank(bids: Vec<Bid>, ratings: &HashMap<String, f64>) -> Vec<RankedBid> {
    let mut live: Vec<(Bid, Option<f64>)> = bids
        .into_iter()
        .filter(|b| b.status == BidStatus::Submitted)
        .map(|b| {
            let rating = ratings.get(&b.supplier_id).copied();
            (b, rating)
        })
        .collect();

    live.sort_by(|(a, ra), (b, rb)| {
        a.unit_price
            .cmp(&b.unit_price)
            .then(a.lead_time_days.cmp(&b.lead_time_days))
            .then_with(|| {
                let ra = ra.unwrap_or(0.0);
                let rb = rb.unwrap_or(0.0);
                rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
            })
    });

    live.into_iter()
        .enumerate()
        .map(|(i, (bid, supplier_rating))| RankedBid {
            rank: i + 1,
            bid,
            supplier_rating,
        })
        .collect()
}

/// Open RFQs a supplier with these specialties can still bid on.
pub async fn open_rfqs_for_supplier(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    categories: &[String],
) -> ProcurementResult<Vec<Rfq>> {
    let skus: HashMap<Uuid, Sku> = tx.fetch::<Sku>().await?.into_iter().map(|s| (s.id, s)).collect();
    let mut open: Vec<Rfq> = tx
        .fetch::<Rfq>()
        .await?
        .into_iter()
        .filter(|r| r.accepts_bids_at(now))
        .filter(|r| {
            r.lines
                .iter()
                .any(|l| skus.get(&l.sku_id).is_some_and(|s| s.in_category(categories)))
        })
        .collect();
    open.sort_by_key(|r| r.bidding_deadline);
    Ok(open)
}
