use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Delay source for rate-limit back-off
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer, so paused test time applies
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What to do after a rate-limited response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then ask again
    RetryAfter(Duration),
    /// Retry budget spent; leave the order for the next pass
    Exhausted,
}

/// Rate-limit retry state for one order within one pass
#[derive(Debug, Clone)]
pub struct RateLimitRetry {
    attempts: u32,
    max_retries: u32,
    next_eligible_at: Option<Instant>,
}

impl RateLimitRetry {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts: 0,
            max_retries,
            next_eligible_at: None,
        }
    }

    /// Register a rate-limited response received at `now`
    pub fn on_rate_limited(&mut self, retry_after: Duration, now: Instant) -> RetryDecision {
        if self.attempts >= self.max_retries {
            self.next_eligible_at = None;
            return RetryDecision::Exhausted;
        }

        self.attempts += 1;
        let eligible_at = now + retry_after;
        self.next_eligible_at = Some(eligible_at);
        RetryDecision::RetryAfter(eligible_at.saturating_duration_since(now))
    }

    /// Retries consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Earliest moment the next query may be sent
    pub fn next_eligible_at(&self) -> Option<Instant> {
        self.next_eligible_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }
}
