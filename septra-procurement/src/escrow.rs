use crate::lifecycle::refresh_group_order;
use crate::models::{Escrow, LogisticsEntry, PharmacyOrder};
use crate::status::{EscrowEvent, EscrowStatus, LogisticsStatus};
use chrono::{DateTime, Utc};
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use tracing::info;
use uuid::Uuid;

/// Make sure the pharmacy's confirmed lines are covered by a funded escrow.
///
/// The first confirmation creates and funds it in one go. Lines confirmed
/// later top the amount up. A settled escrow cannot take more money.
pub(crate) async fn ensure_funded(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    order: &PharmacyOrder,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Escrow> {
    let amount = order.confirmed_value();
    let mut escrows = tx.fetch::<Escrow>().await?;
    let position = escrows
        .iter()
        .position(|e| e.rfq_id == order.rfq_id && e.pharmacy_id == order.pharmacy_id);

    let escrow = match position {
        Some(position) => {
            let escrow = &mut escrows[position];
            if escrow.amount == amount {
                return Ok(escrow.clone());
            }
            if escrow.status != EscrowStatus::Funded {
                return Err(ProcurementError::transition("Escrow", escrow.id, escrow.status, "top_up"));
            }
            info!("Escrow {} topped up {} -> {}", escrow.id, escrow.amount, amount);
            escrow.amount = amount;
            escrow.touch(now);
            escrow.clone()
        }
        None => {
            let mut escrow = Escrow::new(order, now);
            escrow.amount = amount;
            escrow.apply(EscrowEvent::Fund, now)?;
            escrows.push(escrow.clone());
            escrow
        }
    };
    tx.stage(&escrows).await?;

    events.push(DomainEvent::EscrowFunded {
        escrow_id: escrow.id,
        rfq_id: escrow.rfq_id,
        pharmacy_id: escrow.pharmacy_id.clone(),
        amount: escrow.amount,
    });
    Ok(escrow)
}

fn reason_or(reason: Option<String>, default: &str) -> String {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Pay the suppliers out. Only once every delivery leg to this pharmacy
/// has arrived.
pub async fn release_escrow(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    escrow_id: Uuid,
    reason: Option<String>,
    default_reason: &str,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Escrow> {
    let mut escrow = tx.find::<Escrow>(escrow_id).await?;
    if escrow.status.on(EscrowEvent::Release).is_none() {
        return Err(ProcurementError::transition("Escrow", escrow.id, escrow.status, EscrowStatus::Released));
    }

    let legs: Vec<LogisticsEntry> = tx
        .fetch::<LogisticsEntry>()
        .await?
        .into_iter()
        .filter(|e| e.rfq_id == escrow.rfq_id && e.pharmacy_id == escrow.pharmacy_id)
        .collect();
    let delivered = legs.iter().filter(|e| e.status == LogisticsStatus::Delivered).count();
    if legs.is_empty() || delivered < legs.len() {
        return Err(ProcurementError::transition(
            "Escrow",
            escrow.id,
            format!("{} ({} of {} deliveries complete)", escrow.status, delivered, legs.len()),
            EscrowStatus::Released,
        ));
    }

    escrow.apply(EscrowEvent::Release, now)?;
    escrow.reason = Some(reason_or(reason, default_reason));
    tx.put(&escrow).await?;

    let order = tx.find::<PharmacyOrder>(escrow.pharmacy_order_id).await?;
    info!("Released escrow {} ({})", escrow.id, escrow.amount);
    events.push(DomainEvent::EscrowReleased {
        escrow_id: escrow.id,
        rfq_id: escrow.rfq_id,
        pharmacy_id: escrow.pharmacy_id.clone(),
        supplier_ids: order.confirmed_suppliers(),
        amount: escrow.amount,
        reason: escrow.reason.clone().unwrap_or_default(),
    });

    refresh_group_order(tx, now, escrow.rfq_id, events).await?;
    Ok(escrow)
}

/// Return the money to the pharmacy.
pub async fn refund_escrow(
    tx: &mut Transaction,
    now: DateTime<Utc>,
    escrow_id: Uuid,
    reason: Option<String>,
    default_reason: &str,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Escrow> {
    let mut escrow = tx.find::<Escrow>(escrow_id).await?;
    escrow.apply(EscrowEvent::Refund, now)?;
    escrow.reason = Some(reason_or(reason, default_reason));
    tx.put(&escrow).await?;

    info!("Refunded escrow {} ({})", escrow.id, escrow.amount);
    events.push(DomainEvent::EscrowRefunded {
        escrow_id: escrow.id,
        rfq_id: escrow.rfq_id,
        pharmacy_id: escrow.pharmacy_id.clone(),
        amount: escrow.amount,
        reason: escrow.reason.clone().unwrap_or_default(),
    });

    refresh_group_order(tx, now, escrow.rfq_id, events).await?;
    Ok(escrow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_falls_back() {
        assert_eq!(reason_or(Some("  ".to_string()), "default"), "default");
        assert_eq!(reason_or(None, "default"), "default");
        assert_eq!(reason_or(Some(" damaged ".to_string()), "default"), "damaged");
    }
}
