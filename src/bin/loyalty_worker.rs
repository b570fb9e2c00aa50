//! Loyalty Worker Binary
//!
//! Runs the accrual reconciliation loop against the configured database until
//! Ctrl-C.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use loyalty_core::config::LoyaltyConfig;
use loyalty_core::database::{DatabaseConnection, DatabaseMigrations};
use loyalty_core::logging::init_structured_logging_with;
use loyalty_core::reconciliation::AccrualWorker;
use loyalty_core::services::LoyaltyServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LoyaltyConfig::load().context("Failed to load configuration")?;
    init_structured_logging_with(config.log_level.as_deref(), config.log_format);

    info!("Starting loyalty worker");

    let db = DatabaseConnection::from_config(&config)
        .await
        .context("Failed to connect to database")?;
    if !db.health_check().await.context("Database health check failed")? {
        anyhow::bail!("Database health check returned an unexpected result");
    }

    if config.run_migrations {
        let applied = DatabaseMigrations::run_all(db.pool(), Path::new(&config.migrations_path))
            .await
            .context("Failed to run migrations")?;
        info!(applied = applied.len(), "Migrations complete");
    }

    let services = LoyaltyServices::postgres(db.pool().clone());
    let worker = Arc::new(
        AccrualWorker::from_config(&config, services.orders.clone())
            .context("Failed to build reconciliation worker")?,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Arc::clone(&worker).spawn(shutdown_rx);

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            // Receiver may already be gone when the worker is disabled
            let _ = shutdown_tx.send(());
        }
        _ = worker.stopped() => {
            warn!("Reconciliation worker is not running; idling until shutdown");
            signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
        }
    }

    handle.await.context("Reconciliation worker task panicked")?;
    db.close().await;
    info!("Loyalty worker stopped");

    Ok(())
}
