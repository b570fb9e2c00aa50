use thiserror::Error;

use super::states::OrderStatus;
use crate::validation::ValidationError;

/// Reasons an accrual verdict cannot be applied to a stored order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Rejected accrual update: {0}")]
    Validation(#[from] ValidationError),

    #[error(
        "Order already {stored_status} with accrual {stored_accrual:?}; refusing {reported_status} with accrual {reported_accrual:?}"
    )]
    TerminalConflict {
        stored_status: OrderStatus,
        stored_accrual: Option<i64>,
        reported_status: OrderStatus,
        reported_accrual: Option<i64>,
    },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
