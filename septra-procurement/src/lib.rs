pub mod award;
pub mod bidding;
pub mod confirmation;
pub mod demand;
pub mod engine;
pub mod escrow;
pub mod fanout;
pub mod fulfillment;
pub mod lifecycle;
pub mod logistics;
pub mod models;
pub mod reporting;
pub mod status;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use bidding::{NewBid, RankedBid, RfqFields};
pub use confirmation::Confirmation;
pub use demand::{DemandUpdate, GroupOrderFields, NewDemand};
pub use engine::{Outcome, ProcurementEngine};
pub use fulfillment::ShipmentDetails;
pub use logistics::LogisticsUpdate;
pub use sweeper::SweepReport;
