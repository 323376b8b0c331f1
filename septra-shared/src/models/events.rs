use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recipient class for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Audience {
    Admin,
    Pharmacy(String),
    Supplier(String),
    AllSuppliers,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Admin => write!(f, "admin"),
            Audience::Pharmacy(id) => write!(f, "pharmacy:{}", id),
            Audience::Supplier(id) => write!(f, "supplier:{}", id),
            Audience::AllSuppliers => write!(f, "suppliers"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    DemandSubmitted {
        demand_id: Uuid,
        pharmacy_id: String,
        sku_id: Uuid,
        quantity: u32,
    },
    GroupOrderCreated {
        group_order_id: Uuid,
        title: String,
        line_count: usize,
        consumed_demands: usize,
    },
    GroupOrderStatusChanged {
        group_order_id: Uuid,
        from: String,
        to: String,
    },
    RfqPublished {
        rfq_id: Uuid,
        group_order_id: Uuid,
        title: String,
        bidding_deadline: DateTime<Utc>,
    },
    BidSubmitted {
        bid_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        sku_id: Uuid,
        unit_price: Decimal,
        quantity: u32,
    },
    BiddingClosed {
        rfq_id: Uuid,
        bid_count: usize,
    },
    BidAwarded {
        bid_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        sku_id: Uuid,
        awarded_price: Decimal,
        awarded_quantity: u32,
    },
    BidRejected {
        bid_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        sku_id: Uuid,
    },
    PharmacyOrderIssued {
        order_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
        total_value: Decimal,
        new_lines: usize,
    },
    SupplierOrderIssued {
        order_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        total_value: Decimal,
        new_lines: usize,
    },
    PharmacyOrderConfirmed {
        order_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
        total_value: Decimal,
    },
    PharmacyOrderDeclined {
        order_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
    },
    EscrowFunded {
        escrow_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
        amount: Decimal,
    },
    EscrowReleased {
        escrow_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
        supplier_ids: Vec<String>,
        amount: Decimal,
        reason: String,
    },
    EscrowRefunded {
        escrow_id: Uuid,
        rfq_id: Uuid,
        pharmacy_id: String,
        amount: Decimal,
        reason: String,
    },
    SupplierOrderAdvanced {
        order_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        from: String,
        to: String,
    },
    LogisticsUpdated {
        entry_id: Uuid,
        rfq_id: Uuid,
        supplier_id: String,
        pharmacy_id: String,
        status: String,
    },
}

impl DomainEvent {
    /// Who should hear about this event.
    pub fn audiences(&self) -> Vec<Audience> {
        match self {
            DomainEvent::DemandSubmitted { .. }
            | DomainEvent::GroupOrderCreated { .. }
            | DomainEvent::GroupOrderStatusChanged { .. }
            | DomainEvent::BidSubmitted { .. } => vec![Audience::Admin],
            DomainEvent::RfqPublished { .. } => vec![Audience::AllSuppliers],
            DomainEvent::BiddingClosed { .. } => vec![Audience::Admin, Audience::AllSuppliers],
            DomainEvent::BidAwarded { supplier_id, .. } => {
                vec![Audience::Supplier(supplier_id.clone()), Audience::Admin]
            }
            DomainEvent::BidRejected { supplier_id, .. } => {
                vec![Audience::Supplier(supplier_id.clone())]
            }
            DomainEvent::PharmacyOrderIssued { pharmacy_id, .. } => {
                vec![Audience::Pharmacy(pharmacy_id.clone())]
            }
            DomainEvent::SupplierOrderIssued { supplier_id, .. } => {
                vec![Audience::Supplier(supplier_id.clone())]
            }
            DomainEvent::PharmacyOrderConfirmed { .. } | DomainEvent::PharmacyOrderDeclined { .. } => {
                vec![Audience::Admin]
            }
            DomainEvent::EscrowFunded { pharmacy_id, .. }
            | DomainEvent::EscrowRefunded { pharmacy_id, .. } => {
                vec![Audience::Pharmacy(pharmacy_id.clone()), Audience::Admin]
            }
            DomainEvent::EscrowReleased { pharmacy_id, supplier_ids, .. } => {
                let mut audiences = vec![Audience::Pharmacy(pharmacy_id.clone()), Audience::Admin];
                audiences.extend(supplier_ids.iter().cloned().map(Audience::Supplier));
                audiences
            }
            DomainEvent::SupplierOrderAdvanced { .. } => vec![Audience::Admin],
            DomainEvent::LogisticsUpdated { pharmacy_id, .. } => {
                vec![Audience::Pharmacy(pharmacy_id.clone()), Audience::Admin]
            }
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainEvent::DemandSubmitted { pharmacy_id, quantity, .. } => {
                write!(f, "Pharmacy {} submitted demand for {} units", pharmacy_id, quantity)
            }
            DomainEvent::GroupOrderCreated { title, line_count, consumed_demands, .. } => write!(
                f,
                "Group order '{}' created with {} lines from {} demands",
                title, line_count, consumed_demands
            ),
            DomainEvent::GroupOrderStatusChanged { group_order_id, from, to } => {
                write!(f, "Group order {} moved from {} to {}", group_order_id, from, to)
            }
            DomainEvent::RfqPublished { title, bidding_deadline, .. } => write!(
                f,
                "New RFQ '{}' is open for bidding until {}",
                title,
                bidding_deadline.to_rfc3339()
            ),
            DomainEvent::BidSubmitted { supplier_id, unit_price, quantity, .. } => write!(
                f,
                "Supplier {} bid {} units at {} per unit",
                supplier_id, quantity, unit_price
            ),
            DomainEvent::BiddingClosed { rfq_id, bid_count } => {
                write!(f, "Bidding closed on RFQ {} with {} bids", rfq_id, bid_count)
            }
            DomainEvent::BidAwarded { awarded_price, awarded_quantity, .. } => write!(
                f,
                "Your bid was awarded: {} units at {} per unit",
                awarded_quantity, awarded_price
            ),
            DomainEvent::BidRejected { rfq_id, .. } => {
                write!(f, "Your bid on RFQ {} was not selected", rfq_id)
            }
            DomainEvent::PharmacyOrderIssued { total_value, new_lines, .. } => write!(
                f,
                "Your order has {} new awarded lines (total {}); please confirm it",
                new_lines, total_value
            ),
            DomainEvent::SupplierOrderIssued { total_value, new_lines, .. } => write!(
                f,
                "You have {} new lines to fulfil (order total {})",
                new_lines, total_value
            ),
            DomainEvent::PharmacyOrderConfirmed { pharmacy_id, total_value, .. } => write!(
                f,
                "Pharmacy {} confirmed its order worth {}",
                pharmacy_id, total_value
            ),
            DomainEvent::PharmacyOrderDeclined { pharmacy_id, .. } => {
                write!(f, "Pharmacy {} declined its order", pharmacy_id)
            }
            DomainEvent::EscrowFunded { amount, .. } => {
                write!(f, "Escrow funded with {}", amount)
            }
            DomainEvent::EscrowReleased { amount, reason, .. } => {
                write!(f, "Escrow of {} released to suppliers: {}", amount, reason)
            }
            DomainEvent::EscrowRefunded { amount, reason, .. } => {
                write!(f, "Escrow of {} refunded: {}", amount, reason)
            }
            DomainEvent::SupplierOrderAdvanced { supplier_id, from, to, .. } => write!(
                f,
                "Supplier {} moved its order from {} to {}",
                supplier_id, from, to
            ),
            DomainEvent::LogisticsUpdated { supplier_id, status, .. } => {
                write!(f, "Shipment from supplier {} is now {}", supplier_id, status)
            }
        }
    }
}
