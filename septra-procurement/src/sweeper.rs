use crate::bidding::close_bidding;
use crate::escrow::ensure_funded;
use crate::fanout::{generate_pharmacy_orders, generate_supplier_orders};
use crate::lifecycle::refresh_group_order;
use crate::logistics::ensure_legs_for_pharmacy;
use crate::models::{Escrow, PharmacyOrder, Rfq};
use crate::status::{LineStatus, RfqStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::ProcurementResult;
use septra_shared::models::events::DomainEvent;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub closed_rfqs: Vec<Uuid>,
    pub reconciled_rfqs: usize,
}

/// Close every open RFQ whose bidding deadline has passed.
pub async fn close_expired_rfqs(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Vec<Uuid>> {
    let expired: Vec<Uuid> = tx
        .fetch::<Rfq>()
        .await?
        .into_iter()
        .filter(|r| r.status == RfqStatus::Open && r.bidding_deadline <= now)
        .map(|r| r.id)
        .collect();

    for rfq_id in &expired {
        close_bidding(tx, now, *rfq_id, events).await?;
        info!("Auto-closed expired RFQ {}", rfq_id);
    }
    Ok(expired)
}

/// Re-run every derived-record step for RFQs that have awards: fan-out,
/// escrow funding, logistics legs and group order status. Running it twice
/// in a row changes nothing the second time.
pub async fn reconcile_derived_records(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<usize> {
    let awarded: Vec<Uuid> = tx
        .fetch::<Rfq>()
        .await?
        .into_iter()
        .filter(|r| r.status == RfqStatus::Awarded)
        .map(|r| r.id)
        .collect();

    for rfq_id in &awarded {
        generate_pharmacy_orders(tx, now, *rfq_id, events).await?;
        generate_supplier_orders(tx, now, *rfq_id, events).await?;

        let confirmed: Vec<PharmacyOrder> = tx
            .fetch::<PharmacyOrder>()
            .await?
            .into_iter()
            .filter(|o| o.rfq_id == *rfq_id && o.lines.iter().any(|l| l.status == LineStatus::Confirmed))
            .collect();
        let escrows = tx.fetch::<Escrow>().await?;
        for order in &confirmed {
            let settled = escrows
                .iter()
                .any(|e| e.pharmacy_order_id == order.id && e.status.is_terminal());
            if settled {
                continue;
            }
            if let Err(e) = ensure_funded(tx, now, order, events).await {
                warn!("Could not fund escrow for pharmacy order {}: {}", order.id, e);
                continue;
            }
            ensure_legs_for_pharmacy(tx, now, order, events).await?;
        }
        refresh_group_order(tx, now, *rfq_id, events).await?;
    }
    Ok(awarded.len())
}
