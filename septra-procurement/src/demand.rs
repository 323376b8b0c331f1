use crate::models::{BreakdownEntry, Demand, GroupOrder, GroupOrderLine};
use crate::status::{DemandStatus, GroupOrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use septra_catalog::catalog::orderable_sku;
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewDemand {
    pub pharmacy_id: String,
    pub sku_id: Uuid,
    pub quantity: u32,
    pub max_unit_price: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DemandUpdate {
    pub quantity: Option<u32>,
    pub max_unit_price: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupOrderFields {
    pub title: String,
    pub description: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub delivery_deadline: Option<DateTime<Utc>>,
}

fn check_quantities(quantity: u32, max_unit_price: Option<Decimal>) -> ProcurementResult<()> {
    if quantity == 0 {
        return Err(ProcurementError::Validation("demand quantity must be positive".to_string()));
    }
    if matches!(max_unit_price, Some(p) if p <= Decimal::ZERO) {
        return Err(ProcurementError::Validation("max unit price must be positive".to_string()));
    }
    Ok(())
}

/// Record a draft demand against an active SKU.
pub async fn record_demand(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    input: NewDemand,
) -> ProcurementResult<Demand> {
    if input.pharmacy_id.trim().is_empty() {
        return Err(ProcurementError::Validation("pharmacy id is required".to_string()));
    }
    check_quantities(input.quantity, input.max_unit_price)?;
    orderable_sku(tx, input.sku_id).await?;

    let demand = Demand {
        id: Uuid::new_v4(),
        pharmacy_id: input.pharmacy_id,
        sku_id: input.sku_id,
        quantity: input.quantity,
        max_unit_price: input.max_unit_price,
        notes: input.notes,
        status: DemandStatus::Draft,
        submitted_at: None,
        revision: 0,
        created_at: now,
        updated_at: now,
    };
    tx.put(&demand).await?;
    Ok(demand)
}

pub async fn update_demand(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    demand_id: Uuid,
    update: DemandUpdate,
) -> ProcurementResult<Demand> {
    let mut demand = tx.find::<Demand>(demand_id).await?;
    if demand.status != DemandStatus::Draft {
        return Err(ProcurementError::transition("Demand", demand.id, demand.status, "edit"));
    }

    let quantity = update.quantity.unwrap_or(demand.quantity);
    let max_unit_price = update.max_unit_price.or(demand.max_unit_price);
    check_quantities(quantity, max_unit_price)?;

    demand.quantity = quantity;
    demand.max_unit_price = max_unit_price;
    if update.notes.is_some() {
        demand.notes = update.notes;
    }
    demand.touch(now);
    tx.put(&demand).await?;
    Ok(demand)
}

/// Draft -> submitted, exactly once.
pub async fn submit_demand(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    demand_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Demand> {
    let mut demand = tx.find::<Demand>(demand_id).await?;
    if demand.status != DemandStatus::Draft {
        return Err(ProcurementError::transition(
            "Demand",
            demand.id,
            demand.status,
            DemandStatus::Submitted,
        ));
    }
    demand.status = DemandStatus::Submitted;
    demand.submitted_at = Some(now);
    demand.touch(now);
    tx.put(&demand).await?;

    events.push(DomainEvent::DemandSubmitted {
        demand_id: demand.id,
        pharmacy_id: demand.pharmacy_id.clone(),
        sku_id: demand.sku_id,
        quantity: demand.quantity,
    });
    Ok(demand)
}

/// Drop a demand that has not been aggregated yet.
pub async fn withdraw_demand(tx: &mut Transaction, demand_id: Uuid) -> ProcurementResult<Demand> {
    let mut demands = tx.fetch::<Demand>().await?;
    let position = demands
        .iter()
        .position(|d| d.id == demand_id)
        .ok_or_else(|| ProcurementError::not_found("Demand", demand_id))?;
    let removed = demands.remove(position);
    tx.stage(&demands).await?;
    Ok(removed)
}

/// Combine submitted demands into one draft group order, one line per SKU,
/// and consume them.
pub async fn aggregate(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    demand_ids: &[Uuid],
    fields: GroupOrderFields,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<GroupOrder> {
    if demand_ids.is_empty() {
        return Err(ProcurementError::Validation("no demands selected".to_string()));
    }
    if fields.title.trim().is_empty() {
        return Err(ProcurementError::Validation("group order title is required".to_string()));
    }
    let unique: HashSet<&Uuid> = demand_ids.iter().collect();
    if unique.len() != demand_ids.len() {
        return Err(ProcurementError::Validation("demand selected more than once".to_string()));
    }
    if let (Some(bidding), Some(delivery)) = (fields.bidding_deadline, fields.delivery_deadline) {
        if delivery < bidding {
            return Err(ProcurementError::Validation(
                "delivery deadline precedes bidding deadline".to_string(),
            ));
        }
    }

    let mut pool = tx.fetch::<Demand>().await?;
    let mut selected = Vec::with_capacity(demand_ids.len());
    for id in demand_ids {
        let demand = pool
            .iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| ProcurementError::not_found("Demand", id))?;
        if demand.status != DemandStatus::Submitted {
            return Err(ProcurementError::Validation(format!(
                "demand {} is {}, only submitted demands can be aggregated",
                id, demand.status
            )));
        }
        selected.push(demand.clone());
    }

    // Lines in order of first appearance
    let mut lines: Vec<GroupOrderLine> = Vec::new();
    for demand in &selected {
        let entry = BreakdownEntry {
            pharmacy_id: demand.pharmacy_id.clone(),
            quantity: demand.quantity,
            demand_id: demand.id,
        };
        match lines.iter_mut().find(|l| l.sku_id == demand.sku_id) {
            Some(line) => {
                line.total_quantity = line.total_quantity.checked_add(demand.quantity).ok_or_else(|| {
                    ProcurementError::Validation(format!("total quantity overflow for SKU {}", demand.sku_id))
                })?;
                line.demand_breakdown.push(entry);
            }
            None => lines.push(GroupOrderLine {
                sku_id: demand.sku_id,
                total_quantity: demand.quantity,
                demand_breakdown: vec![entry],
                award: None,
            }),
        }
    }

    let group_order = GroupOrder {
        id: Uuid::new_v4(),
        title: fields.title.trim().to_string(),
        description: fields.description,
        bidding_deadline: fields.bidding_deadline,
        delivery_deadline: fields.delivery_deadline,
        lines,
        status: GroupOrderStatus::Draft,
        active_rfq_id: None,
        total_value: None,
        revision: 0,
        created_at: now,
        updated_at: now,
    };
    group_order.check_breakdowns()?;

    pool.retain(|d| !unique.contains(&d.id));
    tx.stage(&pool).await?;
    tx.put(&group_order).await?;

    info!(
        "Aggregated {} demands into group order {} ({} lines)",
        selected.len(),
        group_order.id,
        group_order.lines.len()
    );
    events.push(DomainEvent::GroupOrderCreated {
        group_order_id: group_order.id,
        title: group_order.title.clone(),
        line_count: group_order.lines.len(),
        consumed_demands: selected.len(),
    });
    Ok(group_order)
}
