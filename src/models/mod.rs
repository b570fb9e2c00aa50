//! # Data Models
//!
//! Orders, withdrawals and the derived balance. Orders and withdrawals map to
//! the `orders` and `withdrawals` tables; the balance is never stored.

pub mod balance;
pub mod order;
pub mod withdrawal;

pub use crate::state_machine::OrderStatus;
pub use balance::Balance;
pub use order::Order;
pub use withdrawal::Withdrawal;
