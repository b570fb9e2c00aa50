//! Error types for the loyalty core.
//!

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::persistence::StoreError;
use crate::services::OrderError;
use crate::state_machine::StateMachineError;

#[derive(Debug, Error)]
pub enum LoyaltyError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Order error: {0}")]
    OrderError(#[from] OrderError),
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for LoyaltyError {
    fn from(err: sqlx::Error) -> Self {
        LoyaltyError::DatabaseError(err.to_string())
    }
}

impl From<config::ConfigError> for LoyaltyError {
    fn from(err: config::ConfigError) -> Self {
        LoyaltyError::ConfigurationError(err.to_string())
    }
}

impl From<StoreError> for LoyaltyError {
    fn from(err: StoreError) -> Self {
        LoyaltyError::DatabaseError(err.to_string())
    }
}

impl From<StateMachineError> for LoyaltyError {
    fn from(err: StateMachineError) -> Self {
        LoyaltyError::StateTransitionError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoyaltyError>;
