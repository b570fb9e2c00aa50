//! # Balance Ledger
//!
//! Derived per-user balance and race-free withdrawals against it.
//!
//! The balance is never stored: it is recomputed from the user's `Processed`
//! orders and withdrawal history on every read. A withdrawal recomputes it
//! inside a [`DebitTransaction`](crate::persistence::DebitTransaction), which
//! holds the user's exclusive section until the insert commits or is dropped.

pub mod balance_ledger;

pub use balance_ledger::{BalanceLedger, LedgerError};
