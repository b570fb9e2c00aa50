//! # Reconciliation Worker
//!
//! Background control loop that settles pending orders against the accrual
//! service.
//!
//! Each pass fetches the `New` orders oldest first, queries the accrual service
//! for each with at most `max_concurrent_queries` requests in flight, and feeds
//! every verdict through the order service. Rate-limited orders back off and
//! retry on their own without holding a query slot; transient failures wait
//! for the next pass.
//!
//! - [`AccrualWorker`] - the loop, constructed once per process
//! - [`RateLimitRetry`] - per-order back-off state within one pass
//! - [`Sleeper`] - injectable delay used for back-off
//! - [`PassReport`] - tally of what one pass did

pub mod report;
pub mod retry;
pub mod worker;

pub use report::{OrderResult, PassReport};
pub use retry::{RateLimitRetry, RetryDecision, Sleeper, TokioSleeper};
pub use worker::{AccrualWorker, WorkerConfig, WorkerState};
