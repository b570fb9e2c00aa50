//! # Database Operations
//!
//! Connection pooling and schema migrations for the Postgres stores.
//!
//! - [`connection`] - pool construction and health check
//! - [`migrations`] - schema migration runner guarded by an advisory lock

pub mod connection;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use migrations::{DatabaseMigrations, Migration};
