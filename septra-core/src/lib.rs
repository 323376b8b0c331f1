pub mod clock;
pub mod notify;
pub mod repository;
pub mod supplier;
pub mod transaction;

use repository::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProcurementError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Deadline passed for RFQ {rfq_id} at {deadline}")]
    DeadlinePassed {
        rfq_id: String,
        deadline: chrono::DateTime<chrono::Utc>,
    },

    #[error("Bid already awarded: {bid_id}")]
    AlreadyAwarded { bid_id: String },

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcurementError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ProcurementError::NotFound { entity, id: id.to_string() }
    }

    pub fn transition(
        entity: &'static str,
        id: impl ToString,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        ProcurementError::InvalidStateTransition {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type ProcurementResult<T> = Result<T, ProcurementError>;
