//! Status enums and their transition tables.
//!
//! Every machine answers "from this state, on this event, where do we go?"
//! with `Some(next)` or `None`. `None` is always an invalid transition.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! status_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandStatus {
    Draft,
    Submitted,
}

status_names!(DemandStatus { Draft => "draft", Submitted => "submitted" });

/// Group order progress. Only ever moves forward, `Cancelled` aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrderStatus {
    Draft,
    RfqOpen,
    BiddingClosed,
    Awarded,
    AwaitingConfirmations,
    Scheduled,
    InDelivery,
    Completed,
    Cancelled,
}

status_names!(GroupOrderStatus {
    Draft => "draft",
    RfqOpen => "rfq_open",
    BiddingClosed => "bidding_closed",
    Awarded => "awarded",
    AwaitingConfirmations => "awaiting_confirmations",
    Scheduled => "scheduled",
    InDelivery => "in_delivery",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl GroupOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupOrderStatus::Completed | GroupOrderStatus::Cancelled)
    }

    /// Forward-only move. `None` when `target` is not ahead of `self`.
    pub fn promote(self, target: GroupOrderStatus) -> Option<GroupOrderStatus> {
        if self.is_terminal() || target == GroupOrderStatus::Cancelled || target <= self {
            return None;
        }
        Some(target)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            GroupOrderStatus::Draft | GroupOrderStatus::RfqOpen | GroupOrderStatus::BiddingClosed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
    Open,
    Closed,
    Awarded,
}

status_names!(RfqStatus { Open => "open", Closed => "closed", Awarded => "awarded" });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfqEvent {
    Close,
    Award,
}

impl RfqStatus {
    pub fn on(self, event: RfqEvent) -> Option<RfqStatus> {
        match (self, event) {
            (RfqStatus::Open, RfqEvent::Close) => Some(RfqStatus::Closed),
            (RfqStatus::Closed, RfqEvent::Award) => Some(RfqStatus::Awarded),
            // Later lines of an already awarded RFQ
            (RfqStatus::Awarded, RfqEvent::Award) => Some(RfqStatus::Awarded),
            _ => None,
        }
    }

    /// Blocks a second RFQ for the same group order.
    pub fn is_active(&self) -> bool {
        matches!(self, RfqStatus::Open | RfqStatus::Awarded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Submitted,
    Awarded,
    Rejected,
}

status_names!(BidStatus { Submitted => "submitted", Awarded => "awarded", Rejected => "rejected" });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidEvent {
    Award,
    Reject,
}

impl BidStatus {
    pub fn on(self, event: BidEvent) -> Option<BidStatus> {
        match (self, event) {
            (BidStatus::Submitted, BidEvent::Award) => Some(BidStatus::Awarded),
            (BidStatus::Submitted, BidEvent::Reject) => Some(BidStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PharmacyOrderStatus {
    Pending,
    Confirmed,
    Declined,
}

status_names!(PharmacyOrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Declined => "declined",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PharmacyOrderEvent {
    Confirm,
    Decline,
}

impl PharmacyOrderStatus {
    pub fn on(self, event: PharmacyOrderEvent) -> Option<PharmacyOrderStatus> {
        match (self, event) {
            (PharmacyOrderStatus::Pending, PharmacyOrderEvent::Confirm) => Some(PharmacyOrderStatus::Confirmed),
            (PharmacyOrderStatus::Pending, PharmacyOrderEvent::Decline) => Some(PharmacyOrderStatus::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pending,
    Confirmed,
    Declined,
}

status_names!(LineStatus { Pending => "pending", Confirmed => "confirmed", Declined => "declined" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    Net30,
    Net60,
    Net90,
}

impl PaymentTerms {
    pub fn days(&self) -> u32 {
        match self {
            PaymentTerms::Net30 => 30,
            PaymentTerms::Net60 => 60,
            PaymentTerms::Net90 => 90,
        }
    }
}

/// Supplier fulfilment, strictly one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierOrderStatus {
    Assigned,
    InFulfillment,
    Shipped,
    Delivered,
    Invoiced,
}

status_names!(SupplierOrderStatus {
    Assigned => "assigned",
    InFulfillment => "in_fulfillment",
    Shipped => "shipped",
    Delivered => "delivered",
    Invoiced => "invoiced",
});

impl SupplierOrderStatus {
    pub fn next(self) -> Option<SupplierOrderStatus> {
        match self {
            SupplierOrderStatus::Assigned => Some(SupplierOrderStatus::InFulfillment),
            SupplierOrderStatus::InFulfillment => Some(SupplierOrderStatus::Shipped),
            SupplierOrderStatus::Shipped => Some(SupplierOrderStatus::Delivered),
            SupplierOrderStatus::Delivered => Some(SupplierOrderStatus::Invoiced),
            SupplierOrderStatus::Invoiced => None,
        }
    }

    /// Where a shipment leg to one pharmacy stands given this order's progress.
    pub fn logistics_status(self) -> LogisticsStatus {
        match self {
            SupplierOrderStatus::Assigned | SupplierOrderStatus::InFulfillment => LogisticsStatus::Pending,
            SupplierOrderStatus::Shipped => LogisticsStatus::PickedUp,
            SupplierOrderStatus::Delivered | SupplierOrderStatus::Invoiced => LogisticsStatus::Delivered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    NotFunded,
    Funded,
    Released,
    Refunded,
}

status_names!(EscrowStatus {
    NotFunded => "not_funded",
    Funded => "funded",
    Released => "released",
    Refunded => "refunded",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowEvent {
    Fund,
    Release,
    Refund,
}

impl EscrowStatus {
    pub fn on(self, event: EscrowEvent) -> Option<EscrowStatus> {
        match (self, event) {
            (EscrowStatus::NotFunded, EscrowEvent::Fund) => Some(EscrowStatus::Funded),
            (EscrowStatus::Funded, EscrowEvent::Release) => Some(EscrowStatus::Released),
            (EscrowStatus::Funded, EscrowEvent::Refund) => Some(EscrowStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

/// Delivery leg progress. Ordered, and never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticsStatus {
    Pending,
    PickedUp,
    InTransit,
    Delivered,
}

status_names!(LogisticsStatus {
    Pending => "pending",
    PickedUp => "picked_up",
    InTransit => "in_transit",
    Delivered => "delivered",
});
