//! # Persistence
//!
//! Storage contracts consumed by the order service, the reconciliation worker
//! and the balance ledger, with two implementations:
//!
//! - [`postgres`] - sqlx-backed stores over the `orders` and `withdrawals` tables
//! - [`memory`] - in-process store with the same semantics, used by tests and
//!   local runs without a database
//!
//! Withdrawals go through a [`DebitTransaction`]: opening one takes the
//! per-user exclusive section (an advisory transaction lock in Postgres, a
//! keyed mutex in memory) and dropping it without `commit` discards every
//! staged write.

pub mod locks;
pub mod memory;
pub mod postgres;

pub use locks::{UserLockGuard, UserLockTable};
pub use memory::MemoryStore;
pub use postgres::{PgLedgerStore, PgOrderStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Order, OrderStatus, Withdrawal};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Order {number} not found")]
    OrderNotFound { number: String },

    #[error("Order number {number} is already registered")]
    OrderNumberTaken { number: String },

    #[error("Withdrawal against order {order_number} already recorded for user {user_id}")]
    DuplicateWithdrawalOrder { user_id: i64, order_number: String },

    #[error("Balance totals of user {user_id} exceed the supported range")]
    BalanceOverflow { user_id: i64 },

    #[error("Order {number} already holds a different final verdict ({stored_status}, accrual {stored_accrual:?})")]
    VerdictConflict {
        number: String,
        stored_status: OrderStatus,
        stored_accrual: Option<i64>,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Orders table access
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Numbers of orders still awaiting a verdict, oldest submission first
    async fn list_pending_numbers(&self) -> StoreResult<Vec<String>>;

    async fn find_by_number(&self, number: &str) -> StoreResult<Option<Order>>;

    /// Insert a `New` order; `OrderNumberTaken` if the number already exists
    async fn create_order(&self, user_id: i64, number: &str) -> StoreResult<Order>;

    /// Orders of one user, newest first
    async fn list_orders(&self, user_id: i64) -> StoreResult<Vec<Order>>;

    /// Write a terminal verdict
    ///
    /// The write lands only while the stored order is still pending or
    /// already holds exactly this verdict; otherwise `VerdictConflict` with
    /// the stored values. `OrderNotFound` if no such order.
    async fn apply_final_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> StoreResult<()>;
}

/// Aggregates and withdrawal history backing the balance ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Sum of accruals over the user's `Processed` orders; `BalanceOverflow`
    /// when it does not fit in an `i64`
    async fn accrued_total(&self, user_id: i64) -> StoreResult<i64>;

    /// Sum of the user's withdrawals
    async fn withdrawn_total(&self, user_id: i64) -> StoreResult<i64>;

    /// Withdrawals of one user, newest first
    async fn list_withdrawals(&self, user_id: i64) -> StoreResult<Vec<Withdrawal>>;

    /// Open a debit for `user_id`, waiting for any other open debit of the
    /// same user to finish first
    async fn begin_debit(&self, user_id: i64) -> StoreResult<Box<dyn DebitTransaction>>;
}

/// All-or-nothing check-and-write scope for one user's withdrawal
#[async_trait]
pub trait DebitTransaction: Send {
    fn user_id(&self) -> i64;

    async fn accrued_total(&mut self) -> StoreResult<i64>;

    async fn withdrawn_total(&mut self) -> StoreResult<i64>;

    /// Stage a withdrawal; `DuplicateWithdrawalOrder` if the pair exists
    async fn insert_withdrawal(
        &mut self,
        order_number: &str,
        amount: i64,
    ) -> StoreResult<Withdrawal>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
