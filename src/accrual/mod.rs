//! # Accrual Service Client
//!
//! The accrual service is the external authority on an order's final status
//! and reward. It is slow, rate-limited and sometimes down, so every answer is
//! collapsed into an [`AccrualOutcome`] value: nothing that goes wrong while
//! talking to it escapes as an error.
//!
//! - [`AccrualOracle`] - the contract the reconciliation worker depends on
//! - [`HttpAccrualClient`] - reqwest-backed adapter for the service's HTTP API

pub mod client;
pub mod outcome;

pub use client::{HttpAccrualClient, HttpAccrualClientConfig};
pub use outcome::{AccrualOutcome, AccrualResponse};

use async_trait::async_trait;

/// Source of accrual verdicts for order numbers
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    /// Ask for the current verdict on `order_number`. Never fails; transport
    /// problems come back as [`AccrualOutcome::Transient`].
    async fn query(&self, order_number: &str) -> AccrualOutcome;
}
