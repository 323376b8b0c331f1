use crate::status::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use septra_core::repository::{Collection, Record};
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record {
    ($ty:ty, $collection:expr, $entity:literal) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;
            const ENTITY: &'static str = $entity;

            fn id(&self) -> Uuid {
                self.id
            }
        }

        impl $ty {
            /// Bump the optimistic revision and modification time.
            pub fn touch(&mut self, now: DateTime<Utc>) {
                self.revision += 1;
                self.updated_at = now;
            }
        }
    };
}

/// A pharmacy's request for one SKU, waiting to be aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub sku_id: Uuid,
    pub quantity: u32,
    pub max_unit_price: Option<Decimal>,
    pub notes: Option<String>,
    pub status: DemandStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Demand, Collection::Demands, "Demand");

/// One contributing demand behind an aggregated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub pharmacy_id: String,
    pub quantity: u32,
    pub demand_id: Uuid,
}

/// The winning bid recorded against a group order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAward {
    pub rfq_id: Uuid,
    pub bid_id: Uuid,
    pub supplier_id: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub awarded_at: DateTime<Utc>,
}

impl LineAward {
    pub fn value(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOrderLine {
    pub sku_id: Uuid,
    pub total_quantity: u32,
    pub demand_breakdown: Vec<BreakdownEntry>,
    pub award: Option<LineAward>,
}

impl GroupOrderLine {
    pub fn breakdown_total(&self) -> u64 {
        self.demand_breakdown.iter().map(|e| u64::from(e.quantity)).sum()
    }

    pub fn unawarded_quantity(&self) -> u32 {
        let awarded = self.award.as_ref().map(|a| a.quantity).unwrap_or(0);
        self.total_quantity.saturating_sub(awarded)
    }

    /// The award made under `rfq_id`, if any.
    pub fn award_for(&self, rfq_id: Uuid) -> Option<&LineAward> {
        self.award.as_ref().filter(|a| a.rfq_id == rfq_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOrder {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub lines: Vec<GroupOrderLine>,
    pub status: GroupOrderStatus,
    pub active_rfq_id: Option<Uuid>,
    /// Sum of awarded line values. `None` until something is awarded.
    pub total_value: Option<Decimal>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(GroupOrder, Collection::GroupOrders, "GroupOrder");

impl GroupOrder {
    pub fn line(&self, sku_id: Uuid) -> Option<&GroupOrderLine> {
        self.lines.iter().find(|l| l.sku_id == sku_id)
    }

    /// Every line's breakdown must add up to its total.
    pub fn check_breakdowns(&self) -> ProcurementResult<()> {
        for line in &self.lines {
            if line.breakdown_total() != u64::from(line.total_quantity) {
                return Err(ProcurementError::Consistency(format!(
                    "group order {} line {}: breakdown sums to {} but total is {}",
                    self.id,
                    line.sku_id,
                    line.breakdown_total(),
                    line.total_quantity
                )));
            }
        }
        Ok(())
    }

    pub fn recompute_total(&mut self) {
        let awarded: Vec<Decimal> = self
            .lines
            .iter()
            .filter_map(|l| l.award.as_ref().map(LineAward::value))
            .collect();
        self.total_value = if awarded.is_empty() {
            None
        } else {
            Some(awarded.into_iter().sum())
        };
    }

    /// Move forward to `target`. Returns the previous status when it moved.
    pub fn promote(&mut self, target: GroupOrderStatus, now: DateTime<Utc>) -> Option<GroupOrderStatus> {
        let next = self.status.promote(target)?;
        let previous = self.status;
        self.status = next;
        self.touch(now);
        Some(previous)
    }
}

/// Snapshot of a group order line taken at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfqLine {
    pub sku_id: Uuid,
    pub total_quantity: u32,
    pub demand_breakdown: Vec<BreakdownEntry>,
    pub awarded_bid_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rfq {
    pub id: Uuid,
    pub group_order_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub terms: Option<String>,
    pub delivery_requirement: Option<String>,
    pub bidding_deadline: DateTime<Utc>,
    pub lines: Vec<RfqLine>,
    pub status: RfqStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Rfq, Collection::Rfqs, "RFQ");

impl Rfq {
    pub fn line(&self, sku_id: Uuid) -> Option<&RfqLine> {
        self.lines.iter().find(|l| l.sku_id == sku_id)
    }

    pub fn accepts_bids_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RfqStatus::Open && now < self.bidding_deadline
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub supplier_id: String,
    pub sku_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub min_quantity: Option<u32>,
    pub lead_time_days: u32,
    pub notes: Option<String>,
    pub status: BidStatus,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Bid, Collection::Bids, "Bid");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyOrderLine {
    pub sku_id: Uuid,
    pub supplier_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub status: LineStatus,
}

impl PharmacyOrderLine {
    pub fn new(sku_id: Uuid, supplier_id: String, quantity: u32, unit_price: Decimal, status: LineStatus) -> Self {
        Self {
            sku_id,
            supplier_id,
            quantity,
            unit_price,
            total: unit_price * Decimal::from(quantity),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyOrder {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub group_order_id: Uuid,
    pub pharmacy_id: String,
    pub lines: Vec<PharmacyOrderLine>,
    pub total_value: Decimal,
    pub status: PharmacyOrderStatus,
    pub payment_terms: Option<PaymentTerms>,
    pub delivery_address: Option<Masked<String>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(PharmacyOrder, Collection::PharmacyOrders, "PharmacyOrder");

impl PharmacyOrder {
    pub fn new(rfq_id: Uuid, group_order_id: Uuid, pharmacy_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfq_id,
            group_order_id,
            pharmacy_id,
            lines: Vec::new(),
            total_value: Decimal::ZERO,
            status: PharmacyOrderStatus::Pending,
            payment_terms: None,
            delivery_address: None,
            confirmed_at: None,
            declined_at: None,
            decline_reason: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recompute_total(&mut self) {
        self.total_value = self.lines.iter().map(|l| l.total).sum();
    }

    pub fn confirmed_value(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.status == LineStatus::Confirmed)
            .map(|l| l.total)
            .sum()
    }

    pub fn has_pending_lines(&self) -> bool {
        self.lines.iter().any(|l| l.status == LineStatus::Pending)
    }

    /// Nothing left for the pharmacy to decide.
    pub fn is_settled(&self) -> bool {
        self.status != PharmacyOrderStatus::Pending && !self.has_pending_lines()
    }

    /// Suppliers this pharmacy has committed to.
    pub fn confirmed_suppliers(&self) -> Vec<String> {
        let mut suppliers: Vec<String> = Vec::new();
        for line in self.lines.iter().filter(|l| l.status == LineStatus::Confirmed) {
            if !suppliers.contains(&line.supplier_id) {
                suppliers.push(line.supplier_id.clone());
            }
        }
        suppliers
    }

    pub fn check_total(&self) -> ProcurementResult<()> {
        let expected: Decimal = self.lines.iter().map(|l| l.total).sum();
        if expected != self.total_value {
            return Err(ProcurementError::Consistency(format!(
                "pharmacy order {} total {} does not match its lines ({})",
                self.id, self.total_value, expected
            )));
        }
        Ok(())
    }
}

/// How much of a supplier order line goes to one pharmacy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub pharmacy_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierOrderLine {
    pub sku_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub pharmacy_breakdown: Vec<Allocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierOrder {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub group_order_id: Uuid,
    pub supplier_id: String,
    pub lines: Vec<SupplierOrderLine>,
    pub total_value: Decimal,
    pub status: SupplierOrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub expected_delivery: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(SupplierOrder, Collection::SupplierOrders, "SupplierOrder");

impl SupplierOrder {
    pub fn new(rfq_id: Uuid, group_order_id: Uuid, supplier_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfq_id,
            group_order_id,
            supplier_id,
            lines: Vec::new(),
            total_value: Decimal::ZERO,
            status: SupplierOrderStatus::Assigned,
            tracking_number: None,
            carrier: None,
            expected_delivery: None,
            shipped_at: None,
            delivered_at: None,
            invoiced_at: None,
            notes: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recompute_total(&mut self) {
        self.total_value = self.lines.iter().map(|l| l.total).sum();
    }

    /// Pharmacies this order delivers to, first appearance first.
    pub fn pharmacies(&self) -> Vec<String> {
        let mut pharmacies: Vec<String> = Vec::new();
        for allocation in self.lines.iter().flat_map(|l| l.pharmacy_breakdown.iter()) {
            if !pharmacies.contains(&allocation.pharmacy_id) {
                pharmacies.push(allocation.pharmacy_id.clone());
            }
        }
        pharmacies
    }
}

/// Payment held for one pharmacy's confirmed lines on one RFQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub pharmacy_id: String,
    pub pharmacy_order_id: Uuid,
    pub amount: Decimal,
    pub status: EscrowStatus,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Escrow, Collection::Escrows, "Escrow");

impl Escrow {
    pub fn new(order: &PharmacyOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfq_id: order.rfq_id,
            pharmacy_id: order.pharmacy_id.clone(),
            pharmacy_order_id: order.id,
            amount: Decimal::ZERO,
            status: EscrowStatus::NotFunded,
            funded_at: None,
            released_at: None,
            refunded_at: None,
            reason: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `event` through the transition table.
    pub fn apply(&mut self, event: EscrowEvent, now: DateTime<Utc>) -> ProcurementResult<()> {
        let next = self.status.on(event).ok_or_else(|| {
            ProcurementError::transition("Escrow", self.id, self.status, format!("{:?}", event).to_lowercase())
        })?;
        match next {
            EscrowStatus::Funded => self.funded_at = Some(now),
            EscrowStatus::Released => self.released_at = Some(now),
            EscrowStatus::Refunded => self.refunded_at = Some(now),
            EscrowStatus::NotFunded => {}
        }
        self.status = next;
        self.touch(now);
        Ok(())
    }
}

/// One delivery leg: supplier to pharmacy, within one RFQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticsEntry {
    pub id: Uuid,
    pub rfq_id: Uuid,
    pub supplier_id: String,
    pub pharmacy_id: String,
    pub supplier_order_id: Uuid,
    pub status: LogisticsStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(LogisticsEntry, Collection::Logistics, "LogisticsEntry");

impl LogisticsEntry {
    pub fn new(order: &SupplierOrder, pharmacy_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfq_id: order.rfq_id,
            supplier_id: order.supplier_id.clone(),
            pharmacy_id,
            supplier_order_id: order.id,
            status: LogisticsStatus::Pending,
            tracking_number: order.tracking_number.clone(),
            carrier: order.carrier.clone(),
            estimated_delivery: order.expected_delivery,
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            notes: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn matches(&self, rfq_id: Uuid, supplier_id: &str, pharmacy_id: &str) -> bool {
        self.rfq_id == rfq_id && self.supplier_id == supplier_id && self.pharmacy_id == pharmacy_id
    }

    /// Move forward to `target`, stamping it only if not stamped before.
    /// Returns false when `target` is not ahead of the current status.
    pub fn reach(&mut self, target: LogisticsStatus, now: DateTime<Utc>) -> bool {
        if target <= self.status {
            return false;
        }
        let stamp = match target {
            LogisticsStatus::PickedUp => &mut self.picked_up_at,
            LogisticsStatus::InTransit => &mut self.in_transit_at,
            LogisticsStatus::Delivered => &mut self.delivered_at,
            LogisticsStatus::Pending => return false,
        };
        stamp.get_or_insert(now);
        self.status = target;
        self.touch(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_breakdown_mismatch_is_a_consistency_error() {
        let now = Utc::now();
        let order = GroupOrder {
            id: Uuid::new_v4(),
            title: "Q3 analgesics".to_string(),
            description: None,
            bidding_deadline: None,
            delivery_deadline: None,
            lines: vec![GroupOrderLine {
                sku_id: Uuid::new_v4(),
                total_quantity: 150,
                demand_breakdown: vec![BreakdownEntry {
                    pharmacy_id: "ph-a".to_string(),
                    quantity: 100,
                    demand_id: Uuid::new_v4(),
                }],
                award: None,
            }],
            status: GroupOrderStatus::Draft,
            active_rfq_id: None,
            total_value: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(order.check_breakdowns(), Err(ProcurementError::Consistency(_))));
    }

    #[test]
    fn test_pharmacy_line_total() {
        let line = PharmacyOrderLine::new(Uuid::new_v4(), "sup-x".to_string(), 100, dec("1.25"), LineStatus::Pending);
        assert_eq!(line.total, dec("125.00"));
    }

    #[test]
    fn test_escrow_refund_after_release_rejected() {
        let now = Utc::now();
        let order = PharmacyOrder::new(Uuid::new_v4(), Uuid::new_v4(), "ph-a".to_string(), now);
        let mut escrow = Escrow::new(&order, now);

        escrow.apply(EscrowEvent::Fund, now).unwrap();
        escrow.apply(EscrowEvent::Release, now).unwrap();
        let err = escrow.apply(EscrowEvent::Refund, now).unwrap_err();
        assert!(matches!(err, ProcurementError::InvalidStateTransition { .. }));
        assert_eq!(escrow.status, EscrowStatus::Released);
        assert!(escrow.refunded_at.is_none());
    }

    #[test]
    fn test_logistics_timestamps_set_once() {
        let start = Utc::now();
        let order = SupplierOrder::new(Uuid::new_v4(), Uuid::new_v4(), "sup-x".to_string(), start);
        let mut entry = LogisticsEntry::new(&order, "ph-a".to_string(), start);

        assert!(entry.reach(LogisticsStatus::PickedUp, start));
        assert!(!entry.reach(LogisticsStatus::PickedUp, start + Duration::hours(1)));
        assert_eq!(entry.picked_up_at, Some(start));

        assert!(entry.reach(LogisticsStatus::Delivered, start + Duration::hours(5)));
        assert!(!entry.reach(LogisticsStatus::InTransit, start + Duration::hours(6)));
        assert_eq!(entry.status, LogisticsStatus::Delivered);
        assert!(entry.in_transit_at.is_none());
    }
}
