use crate::models::{LogisticsEntry, PharmacyOrder, SupplierOrder};
use crate::status::{LineStatus, LogisticsStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct LogisticsUpdate {
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

fn updated(entry: &LogisticsEntry) -> DomainEvent {
    DomainEvent::LogisticsUpdated {
        entry_id: entry.id,
        rfq_id: entry.rfq_id,
        supplier_id: entry.supplier_id.clone(),
        pharmacy_id: entry.pharmacy_id.clone(),
        status: entry.status.to_string(),
    }
}

/// Create the leg if missing and move it up to `target`. Never moves it
/// back. Returns true when anything changed.
fn upsert_leg(
    entries: &mut Vec<LogisticsEntry>,
    now: DateTime<Utc>,
    order: &SupplierOrder,
    pharmacy_id: &str,
    target: LogisticsStatus,
    events: &mut Vec<DomainEvent>,
) -> bool {
    let (position, created) = match entries
        .iter()
        .position(|e| e.matches(order.rfq_id, &order.supplier_id, pharmacy_id))
    {
        Some(position) => (position, false),
        None => {
            entries.push(LogisticsEntry::new(order, pharmacy_id.to_string(), now));
            (entries.len() - 1, true)
        }
    };

    let entry = &mut entries[position];
    let mut changed = created;
    if entry.tracking_number.is_none() && order.tracking_number.is_some() {
        entry.tracking_number = order.tracking_number.clone();
        entry.carrier = order.carrier.clone();
        entry.estimated_delivery = order.expected_delivery;
        entry.touch(now);
        changed = true;
    }
    let advanced = entry.reach(target, now);
    if created || advanced {
        events.push(updated(entry));
    }
    changed || advanced
}

/// Legs for every supplier a pharmacy has confirmed lines with, caught up
/// to wherever that supplier's order already is.
pub(crate) async fn ensure_legs_for_pharmacy(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order: &PharmacyOrder,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<()> {
    let supplier_orders = tx.fetch::<SupplierOrder>().await?;
    let mut entries = tx.fetch::<LogisticsEntry>().await?;
    let mut dirty = false;

    for supplier_id in order.confirmed_suppliers() {
        let supplier_order = supplier_orders
            .iter()
            .find(|s| s.rfq_id == order.rfq_id && s.supplier_id == supplier_id)
            .ok_or_else(|| {
                ProcurementError::Consistency(format!(
                    "no supplier order for {} on RFQ {}",
                    supplier_id, order.rfq_id
                ))
            })?;
        let target = supplier_order.status.logistics_status();
        dirty |= upsert_leg(&mut entries, now, supplier_order, &order.pharmacy_id, target, events);
    }

    if dirty {
        tx.stage(&entries).await?;
    }
    Ok(())
}

/// Push a supplier's progress onto the legs of every pharmacy that has
/// confirmed lines with it.
pub(crate) async fn sync_legs_for_supplier(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order: &SupplierOrder,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<()> {
    let pharmacy_orders = tx.fetch::<PharmacyOrder>().await?;
    let mut entries = tx.fetch::<LogisticsEntry>().await?;
    let target = order.status.logistics_status();
    let mut dirty = false;

    for pharmacy_id in order.pharmacies() {
        let committed = pharmacy_orders.iter().any(|p| {
            p.rfq_id == order.rfq_id
                && p.pharmacy_id == pharmacy_id
                && p.lines
                    .iter()
                    .any(|l| l.supplier_id == order.supplier_id && l.status == LineStatus::Confirmed)
        });
        if committed {
            dirty |= upsert_leg(&mut entries, now, order, &pharmacy_id, target, events);
        }
    }

    if dirty {
        tx.stage(&entries).await?;
    }
    Ok(())
}

/// Manual progress report on one leg. Same status again is a no-op, going
/// backwards is an error, skipping ahead is allowed.
pub async fn advance_logistics(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    entry_id: Uuid,
    target: LogisticsStatus,
    update: LogisticsUpdate,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<LogisticsEntry> {
    let mut entry = tx.find::<LogisticsEntry>(entry_id).await?;
    if target < entry.status {
        return Err(ProcurementError::transition("LogisticsEntry", entry.id, entry.status, target));
    }

    let mut changed = false;
    if let Some(tracking) = update.tracking_number.filter(|t| !t.trim().is_empty()) {
        if entry.tracking_number.as_deref() != Some(tracking.as_str()) {
            entry.tracking_number = Some(tracking);
            changed = true;
        }
    }
    if update.notes.is_some() && update.notes != entry.notes {
        entry.notes = update.notes;
        changed = true;
    }
    if changed {
        entry.touch(now);
    }
    if entry.reach(target, now) {
        info!("Logistics {} -> {}", entry.id, entry.status);
        events.push(updated(&entry));
        changed = true;
    }
    if changed {
        tx.put(&entry).await?;
    }
    Ok(entry)
}
