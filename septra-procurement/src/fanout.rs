//! Derives pharmacy and supplier orders from awarded lines.
//!
//! Both generators are upserts keyed by (RFQ, pharmacy) and (RFQ, supplier)
//! with lines merged by SKU, so running them again after every award, every
//! confirmation or every sweep never duplicates anything.

use crate::bidding::{group_order_mut, status_changed};
use crate::models::{
    Allocation, BreakdownEntry, GroupOrder, PharmacyOrder, PharmacyOrderLine, Rfq, SupplierOrder,
    SupplierOrderLine,
};
use crate::status::{GroupOrderStatus, LineStatus, PharmacyOrderStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Split `awarded` units across a line's breakdown, one allocation per
/// pharmacy in order of first appearance.
///
/// A fully awarded line hands every pharmacy exactly its demanded share. A
/// partial award is split pro rata with the leftover units going to the
/// largest remainders (earlier entries win ties), so the allocations always
/// add up to `awarded`.
pub fn allocate(breakdown: &[BreakdownEntry], awarded: u32) -> Vec<Allocation> {
    let total: u64 = breakdown.iter().map(|e| u64::from(e.quantity)).sum();
    if total == 0 {
        return Vec::new();
    }
    let awarded = u64::from(awarded).min(total);

    let mut shares: Vec<u64> = Vec::with_capacity(breakdown.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(breakdown.len());
    for (i, entry) in breakdown.iter().enumerate() {
        let exact = u64::from(entry.quantity) * awarded;
        shares.push(exact / total);
        remainders.push((exact % total, i));
    }
    let mut leftover = awarded - shares.iter().sum::<u64>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders {
        if leftover == 0 {
            break;
        }
        shares[i] += 1;
        leftover -= 1;
    }

    let mut allocations: Vec<Allocation> = Vec::new();
    for (entry, share) in breakdown.iter().zip(shares) {
        // share <= entry.quantity, so it fits in u32
        let share = share as u32;
        match allocations.iter_mut().find(|a| a.pharmacy_id == entry.pharmacy_id) {
            Some(existing) => existing.quantity += share,
            None => allocations.push(Allocation {
                pharmacy_id: entry.pharmacy_id.clone(),
                quantity: share,
            }),
        }
    }
    allocations
}

async fn rfq_and_group(
    tx: &mut Transaction,
    rfq_id: Uuid,
) -> ProcurementResult<(Rfq, Vec<GroupOrder>, usize)> {
    let rfq = tx.find::<Rfq>(rfq_id).await?;
    let (group_orders, index) = group_order_mut(tx, rfq.group_order_id).await.map_err(|e| match e {
        ProcurementError::NotFound { .. } => ProcurementError::Consistency(format!(
            "RFQ {} points at missing group order {}",
            rfq.id, rfq.group_order_id
        )),
        other => other,
    })?;
    Ok((rfq, group_orders, index))
}

/// Upsert one pharmacy order per pharmacy with awarded demand on this RFQ.
pub async fn generate_pharmacy_orders(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    rfq_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Vec<PharmacyOrder>> {
    let (rfq, mut group_orders, index) = rfq_and_group(tx, rfq_id).await?;
    let mut orders = tx.fetch::<PharmacyOrder>().await?;
    let mut added: Vec<(usize, usize)> = Vec::new();

    for line in &group_orders[index].lines {
        let Some(award) = line.award_for(rfq.id) else {
            continue;
        };
        for allocation in allocate(&line.demand_breakdown, award.quantity) {
            if allocation.quantity == 0 {
                continue;
            }
            let position = match orders
                .iter()
                .position(|o| o.rfq_id == rfq.id && o.pharmacy_id == allocation.pharmacy_id)
            {
                Some(position) => position,
                None => {
                    orders.push(PharmacyOrder::new(
                        rfq.id,
                        rfq.group_order_id,
                        allocation.pharmacy_id.clone(),
                        now,
                    ));
                    orders.len() - 1
                }
            };
            let order = &mut orders[position];
            if order.lines.iter().any(|l| l.sku_id == line.sku_id) {
                continue;
            }
            // A pharmacy that declined the order is not asked again
            let status = match order.status {
                PharmacyOrderStatus::Declined => LineStatus::Declined,
                _ => LineStatus::Pending,
            };
            order.lines.push(PharmacyOrderLine::new(
                line.sku_id,
                award.supplier_id.clone(),
                allocation.quantity,
                award.unit_price,
                status,
            ));
            match added.iter_mut().find(|(p, _)| *p == position) {
                Some((_, count)) => *count += 1,
                None => added.push((position, 1)),
            }
        }
    }

    let awarded_skus: HashSet<Uuid> = group_orders[index]
        .lines
        .iter()
        .filter(|l| l.award_for(rfq.id).is_some())
        .map(|l| l.sku_id)
        .collect();

    for (position, new_lines) in &added {
        let order = &mut orders[*position];
        order.recompute_total();
        order.touch(now);
        debug!("Pharmacy order {} gained {} lines", order.id, new_lines);
        events.push(DomainEvent::PharmacyOrderIssued {
            order_id: order.id,
            rfq_id: rfq.id,
            pharmacy_id: order.pharmacy_id.clone(),
            total_value: order.total_value,
            new_lines: *new_lines,
        });
    }

    let for_rfq: Vec<PharmacyOrder> = orders.iter().filter(|o| o.rfq_id == rfq.id).cloned().collect();
    for order in &for_rfq {
        order.check_total()?;
        if let Some(stray) = order.lines.iter().find(|l| !awarded_skus.contains(&l.sku_id)) {
            return Err(ProcurementError::Consistency(format!(
                "pharmacy order {} has SKU {} that was never awarded",
                order.id, stray.sku_id
            )));
        }
    }

    if !added.is_empty() {
        tx.stage(&orders).await?;
    }
    if !for_rfq.is_empty() {
        let previous = group_orders[index].promote(GroupOrderStatus::AwaitingConfirmations, now);
        if previous.is_some() {
            status_changed(events, &group_orders[index], previous);
            tx.stage(&group_orders).await?;
        }
    }
    Ok(for_rfq)
}

/// Upsert one supplier order per awarded supplier on this RFQ.
pub async fn generate_supplier_orders(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    rfq_id: Uuid,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Vec<SupplierOrder>> {
    let (rfq, group_orders, index) = rfq_and_group(tx, rfq_id).await?;
    let mut orders = tx.fetch::<SupplierOrder>().await?;
    let mut added: Vec<(usize, usize)> = Vec::new();

    for line in &group_orders[index].lines {
        let Some(award) = line.award_for(rfq.id) else {
            continue;
        };
        let position = match orders
            .iter()
            .position(|o| o.rfq_id == rfq.id && o.supplier_id == award.supplier_id)
        {
            Some(position) => position,
            None => {
                orders.push(SupplierOrder::new(
                    rfq.id,
                    rfq.group_order_id,
                    award.supplier_id.clone(),
                    now,
                ));
                orders.len() - 1
            }
        };
        let order = &mut orders[position];
        if order.lines.iter().any(|l| l.sku_id == line.sku_id) {
            continue;
        }
        order.lines.push(SupplierOrderLine {
            sku_id: line.sku_id,
            quantity: award.quantity,
            unit_price: award.unit_price,
            total: award.value(),
            pharmacy_breakdown: allocate(&line.demand_breakdown, award.quantity),
        });
        match added.iter_mut().find(|(p, _)| *p == position) {
            Some((_, count)) => *count += 1,
            None => added.push((position, 1)),
        }
    }

    for (position, new_lines) in &added {
        let order = &mut orders[*position];
        order.recompute_total();
        order.touch(now);
        events.push(DomainEvent::SupplierOrderIssued {
            order_id: order.id,
            rfq_id: rfq.id,
            supplier_id: order.supplier_id.clone(),
            total_value: order.total_value,
            new_lines: *new_lines,
        });
    }
    if !added.is_empty() {
        tx.stage(&orders).await?;
    }
    Ok(orders.into_iter().filter(|o| o.rfq_id == rfq.id).collect())
}
