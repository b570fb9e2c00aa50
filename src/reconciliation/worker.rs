use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::report::{OrderResult, PassReport};
use super::retry::{RateLimitRetry, RetryDecision, Sleeper, TokioSleeper};
use crate::accrual::{AccrualOracle, AccrualOutcome, HttpAccrualClient};
use crate::config::LoyaltyConfig;
use crate::constants::worker::{
    DEFAULT_MAX_CONCURRENT_QUERIES, DEFAULT_MAX_RATE_LIMIT_RETRIES, DEFAULT_POLL_INTERVAL_MS,
};
use crate::error::Result;
use crate::logging::log_error;
use crate::services::{OrderError, OrderService};

/// Configuration for the reconciliation worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between pass starts; a slow pass delays the next one
    pub poll_interval: Duration,
    /// Upper bound on accrual queries in flight
    pub max_concurrent_queries: usize,
    /// Retries per order per pass after a rate-limited response
    pub max_rate_limit_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

/// Lifecycle of the worker: `Idle → Running → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Polls the accrual service for pending orders and applies its verdicts
///
/// Without an oracle the worker is disabled: [`AccrualWorker::run`] moves
/// straight to `Stopped` and never polls.
pub struct AccrualWorker {
    orders: OrderService,
    oracle: Option<Arc<dyn AccrualOracle>>,
    sleeper: Arc<dyn Sleeper>,
    config: WorkerConfig,
    state: watch::Sender<WorkerState>,
    last_report: RwLock<Option<PassReport>>,
    passes_completed: AtomicU64,
}

impl fmt::Debug for AccrualWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccrualWorker")
            .field("config", &self.config)
            .field("enabled", &self.oracle.is_some())
            .field("state", &self.state())
            .field("passes_completed", &self.passes_completed())
            .finish()
    }
}

impl AccrualWorker {
    pub fn new(
        orders: OrderService,
        oracle: Option<Arc<dyn AccrualOracle>>,
        config: WorkerConfig,
    ) -> Self {
        Self::with_sleeper(orders, oracle, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        orders: OrderService,
        oracle: Option<Arc<dyn AccrualOracle>>,
        config: WorkerConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            orders,
            oracle,
            sleeper,
            config,
            state: watch::Sender::new(WorkerState::Idle),
            last_report: RwLock::new(None),
            passes_completed: AtomicU64::new(0),
        }
    }

    /// Build the worker and its HTTP oracle from configuration
    pub fn from_config(config: &LoyaltyConfig, orders: OrderService) -> Result<Self> {
        let oracle = match config.accrual_client_config() {
            Some(client_config) => {
                Some(Arc::new(HttpAccrualClient::new(client_config)?) as Arc<dyn AccrualOracle>)
            }
            None => None,
        };
        Ok(Self::new(orders, oracle, config.worker_config()))
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver notified on every lifecycle change
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Resolve once the worker has reached `Stopped`
    pub async fn stopped(&self) {
        let mut state = self.subscribe_state();
        // The sender lives in `self`, so the channel cannot close here
        let _ = state.wait_for(|s| *s == WorkerState::Stopped).await;
    }

    pub fn is_enabled(&self) -> bool {
        self.oracle.is_some()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn last_report(&self) -> Option<PassReport> {
        *self.last_report.read()
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::SeqCst)
    }

    /// Run the polling loop on a background task
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Poll until `shutdown` fires or its sender is dropped
    ///
    /// The first pass starts immediately. Shutdown abandons an in-flight pass
    /// without waiting for its queries.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let Some(oracle) = self.oracle.clone() else {
            info!("Accrual service address not configured; reconciliation worker disabled");
            self.state.send_replace(WorkerState::Stopped);
            return;
        };

        self.state.send_replace(WorkerState::Running);
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            max_concurrent_queries = self.config.max_concurrent_queries,
            max_rate_limit_retries = self.config.max_rate_limit_retries,
            "Starting reconciliation worker"
        );

        let mut ticker = interval(self.config.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutdown during reconciliation pass; abandoning in-flight queries");
                    break;
                }
                result = self.run_pass_with(oracle.as_ref()) => self.record_pass(result),
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        info!(
            passes_completed = self.passes_completed(),
            "Reconciliation worker stopped"
        );
    }

    /// Run one pass now, independent of the loop
    ///
    /// A disabled worker returns an empty report without touching the store.
    pub async fn run_pass(&self) -> std::result::Result<PassReport, OrderError> {
        match self.oracle.clone() {
            Some(oracle) => self.run_pass_with(oracle.as_ref()).await,
            None => Ok(PassReport::default()),
        }
    }

    fn record_pass(&self, result: std::result::Result<PassReport, OrderError>) {
        match result {
            Ok(report) => {
                self.passes_completed.fetch_add(1, Ordering::SeqCst);
                *self.last_report.write() = Some(report);
                if report.is_empty() {
                    debug!("No pending orders");
                } else {
                    info!(
                        fetched = report.fetched,
                        finalized = report.finalized,
                        unchanged = report.unchanged,
                        deferred = report.deferred,
                        rate_limit_exhausted = report.rate_limit_exhausted,
                        rejected = report.rejected,
                        failed = report.failed,
                        "Reconciliation pass completed"
                    );
                }
            }
            Err(e) => {
                log_error(
                    "reconciliation",
                    "list_pending_orders",
                    &e.to_string(),
                    Some("pass skipped; retrying next tick"),
                );
            }
        }
    }

    async fn run_pass_with(
        &self,
        oracle: &dyn AccrualOracle,
    ) -> std::result::Result<PassReport, OrderError> {
        let numbers = self.orders.get_pending_orders().await?;
        let mut report = PassReport::with_fetched(numbers.len());
        if numbers.is_empty() {
            return Ok(report);
        }

        debug!(pending = numbers.len(), "Reconciling pending orders");

        let slots = Semaphore::new(self.config.max_concurrent_queries.max(1));
        let mut in_flight: FuturesUnordered<_> = numbers
            .iter()
            .map(|number| self.reconcile_order(oracle, &slots, number))
            .collect();

        while let Some(result) = in_flight.next().await {
            report.record(result);
        }

        Ok(report)
    }

    /// Query and apply one order, backing off while rate limited
    async fn reconcile_order(
        &self,
        oracle: &dyn AccrualOracle,
        slots: &Semaphore,
        number: &str,
    ) -> OrderResult {
        let mut retry = RateLimitRetry::new(self.config.max_rate_limit_retries);

        loop {
            // The slot covers the query only, never the back-off sleep
            let outcome = match slots.acquire().await {
                Ok(_permit) => oracle.query(number).await,
                Err(_) => return OrderResult::Deferred,
            };

            match outcome {
                AccrualOutcome::RateLimited { retry_after } => {
                    match retry.on_rate_limited(retry_after, Instant::now()) {
                        RetryDecision::RetryAfter(delay) => {
                            debug!(
                                order_number = %number,
                                attempt = retry.attempts(),
                                retry_after_secs = delay.as_secs(),
                                "Accrual service rate limited; backing off"
                            );
                            self.sleeper.sleep(delay).await;
                        }
                        RetryDecision::Exhausted => {
                            warn!(
                                order_number = %number,
                                retries = retry.attempts(),
                                "Rate limit retries exhausted; order deferred to next pass"
                            );
                            return OrderResult::RateLimitExhausted;
                        }
                    }
                }
                AccrualOutcome::Transient { reason } => {
                    warn!(order_number = %number, reason = %reason, "Accrual query failed; order deferred to next pass");
                    return OrderResult::Deferred;
                }
                AccrualOutcome::NotRegistered => {
                    return Self::classify(number, self.orders.apply_not_registered(number).await);
                }
                AccrualOutcome::Resolved { status, accrual } => {
                    return Self::classify(
                        number,
                        self.orders.apply_accrual_result(number, status, accrual).await,
                    );
                }
            }
        }
    }

    fn classify(
        number: &str,
        applied: std::result::Result<crate::state_machine::Transition, OrderError>,
    ) -> OrderResult {
        match applied {
            Ok(transition) if transition.is_write() => OrderResult::Finalized,
            Ok(_) => OrderResult::Unchanged,
            Err(e) if e.is_transient() => {
                error!(order_number = %number, error = %e, "Failed to store accrual verdict");
                OrderResult::Failed
            }
            Err(e) => {
                warn!(order_number = %number, error = %e, "Accrual verdict rejected");
                OrderResult::Rejected
            }
        }
    }
}
