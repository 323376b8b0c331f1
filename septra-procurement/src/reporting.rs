use crate::models::{Bid, Escrow, GroupOrder};
use crate::status::{BidStatus, EscrowStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EscrowSummary {
    pub funded_count: usize,
    pub funded_amount: Decimal,
    pub released_count: usize,
    pub released_amount: Decimal,
    pub refunded_count: usize,
    pub refunded_amount: Decimal,
}

/// Ledger totals by escrow state, optionally for one RFQ.
pub fn escrow_summary(escrows: &[Escrow], rfq_id: Option<Uuid>) -> EscrowSummary {
    let mut summary = EscrowSummary::default();
    for escrow in escrows.iter().filter(|e| rfq_id.map_or(true, |id| e.rfq_id == id)) {
        match escrow.status {
            EscrowStatus::Funded => {
                summary.funded_count += 1;
                summary.funded_amount += escrow.amount;
            }
            EscrowStatus::Released => {
                summary.released_count += 1;
                summary.released_amount += escrow.amount;
            }
            EscrowStatus::Refunded => {
                summary.refunded_count += 1;
                summary.refunded_amount += escrow.amount;
            }
            EscrowStatus::NotFunded => {}
        }
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierPerformance {
    pub supplier_id: String,
    pub bids_submitted: usize,
    pub bids_awarded: usize,
    pub win_rate: f64,
    pub awarded_value: Decimal,
}

/// Per-supplier bid counts and awarded value. Awarded value comes from the
/// group order lines, so it reflects capped quantities.
pub fn supplier_performance(bids: &[Bid], group_orders: &[GroupOrder]) -> Vec<SupplierPerformance> {
    let mut by_supplier: BTreeMap<&str, SupplierPerformance> = BTreeMap::new();
    for bid in bids {
        let entry = by_supplier
            .entry(bid.supplier_id.as_str())
            .or_insert_with(|| SupplierPerformance {
                supplier_id: bid.supplier_id.clone(),
                bids_submitted: 0,
                bids_awarded: 0,
                win_rate: 0.0,
                awarded_value: Decimal::ZERO,
            });
        entry.bids_submitted += 1;
        if bid.status == BidStatus::Awarded {
            entry.bids_awarded += 1;
        }
    }

    let awards = group_orders
        .iter()
        .flat_map(|g| g.lines.iter())
        .filter_map(|l| l.award.as_ref());
    for award in awards {
        if let Some(entry) = by_supplier.get_mut(award.supplier_id.as_str()) {
            entry.awarded_value += award.value();
        }
    }

    by_supplier
        .into_values()
        .map(|mut p| {
            p.win_rate = p.bids_awarded as f64 / p.bids_submitted as f64;
            p
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineShortfall {
    pub group_order_id: Uuid,
    pub sku_id: Uuid,
    pub total_quantity: u32,
    pub awarded_quantity: u32,
    pub unawarded_quantity: u32,
}

/// Awarded lines that cover less than the pooled demand. The remainder is
/// not re-bid automatically.
pub fn award_shortfalls(group_orders: &[GroupOrder]) -> Vec<LineShortfall> {
    group_orders
        .iter()
        .flat_map(|g| {
            g.lines.iter().filter_map(move |l| {
                let award = l.award.as_ref()?;
                (l.unawarded_quantity() > 0).then(|| LineShortfall {
                    group_order_id: g.id,
                    sku_id: l.sku_id,
                    total_quantity: l.total_quantity,
                    awarded_quantity: award.quantity,
                    unawarded_quantity: l.unawarded_quantity(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PharmacyOrder;
    use crate::status::EscrowEvent;
    use chrono::Utc;

    fn escrow(rfq_id: Uuid, amount: &str, event: Option<EscrowEvent>) -> Escrow {
        let now = Utc::now();
        let order = PharmacyOrder::new(rfq_id, Uuid::new_v4(), "ph".to_string(), now);
        let mut escrow = Escrow::new(&order, now);
        escrow.amount = amount.parse().unwrap();
        escrow.apply(EscrowEvent::Fund, now).unwrap();
        if let Some(event) = event {
            escrow.apply(event, now).unwrap();
        }
        escrow
    }

    #[test]
    fn test_escrow_summary_filters_by_rfq() {
        let rfq = Uuid::new_v4();
        let escrows = vec![
            escrow(rfq, "100.00", None),
            escrow(rfq, "50.00", Some(EscrowEvent::Release)),
            escrow(rfq, "20.00", Some(EscrowEvent::Refund)),
            escrow(Uuid::new_v4(), "999.00", None),
        ];

        let summary = escrow_summary(&escrows, Some(rfq));
        assert_eq!(summary.funded_amount, "100.00".parse::<Decimal>().unwrap());
        assert_eq!(summary.released_count, 1);
        assert_eq!(summary.refunded_amount, "20.00".parse::<Decimal>().unwrap());

        let all = escrow_summary(&escrows, None);
        assert_eq!(all.funded_count, 2);
    }
}
