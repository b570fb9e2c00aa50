#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Loyalty Core
//!
//! Order accrual reconciliation and balance ledger for a loyalty points system.
//!
//! ## Overview
//!
//! Users submit order numbers; an external accrual service decides, eventually,
//! whether each order earns points and how many. This crate keeps the two in
//! sync and lets users spend what they have earned.
//!
//! ## Architecture
//!
//! - A **reconciliation worker** polls the accrual service for every `New`
//!   order with bounded concurrency, backs off when rate limited, and writes
//!   terminal verdicts through the order status machine.
//! - A **balance ledger** derives balances from processed orders and
//!   withdrawals and debits them under a per-user exclusive section, so
//!   concurrent withdrawals can never overspend.
//!
//! ## Module Organization
//!
//! - [`accrual`] - accrual service contract and HTTP adapter
//! - [`state_machine`] - order status transitions
//! - [`reconciliation`] - the polling worker
//! - [`ledger`] - balances and withdrawals
//! - [`services`] - order service and the service container
//! - [`persistence`] - store contracts, Postgres and in-memory stores
//! - [`database`] - pool and migrations
//! - [`config`] - layered configuration
//! - [`logging`] - tracing setup and structured operation logs
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loyalty_core::persistence::MemoryStore;
//! use loyalty_core::services::LoyaltyServices;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = LoyaltyServices::in_memory(MemoryStore::new());
//!
//! services.orders.submit_order(1, "79927398713").await?;
//! let balance = services.ledger.get_balance(1).await?;
//! println!("current={} withdrawn={}", balance.current, balance.withdrawn);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Every store-dependent test runs against [`persistence::MemoryStore`], so no
//! database is required:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod accrual;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod reconciliation;
pub mod services;
pub mod state_machine;
pub mod validation;

pub use accrual::{AccrualOracle, AccrualOutcome, HttpAccrualClient};
pub use config::LoyaltyConfig;
pub use error::{LoyaltyError, Result};
pub use ledger::{BalanceLedger, LedgerError};
pub use models::{Balance, Order, OrderStatus, Withdrawal};
pub use reconciliation::{AccrualWorker, PassReport, WorkerConfig, WorkerState};
pub use services::{LoyaltyServices, OrderError, OrderService, SubmitOutcome};
