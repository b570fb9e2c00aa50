use serde::Serialize;

/// How one order ended within one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderResult {
    /// Terminal verdict written
    Finalized,
    /// Verdict not final yet; order left as is
    Unchanged,
    /// Transient oracle failure; revisited next pass
    Deferred,
    /// Still rate limited after every retry; revisited next pass
    RateLimitExhausted,
    /// Verdict refused (negative accrual, conflicting verdict, unknown order)
    Rejected,
    /// Persistence failure while applying the verdict; revisited next pass
    Failed,
}

/// Tally of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub fetched: usize,
    pub finalized: usize,
    pub unchanged: usize,
    pub deferred: usize,
    pub rate_limit_exhausted: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl PassReport {
    pub fn with_fetched(fetched: usize) -> Self {
        Self {
            fetched,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: OrderResult) {
        let counter = match result {
            OrderResult::Finalized => &mut self.finalized,
            OrderResult::Unchanged => &mut self.unchanged,
            OrderResult::Deferred => &mut self.deferred,
            OrderResult::RateLimitExhausted => &mut self.rate_limit_exhausted,
            OrderResult::Rejected => &mut self.rejected,
            OrderResult::Failed => &mut self.failed,
        };
        *counter += 1;
    }

    /// Orders that reached an outcome this pass
    pub fn settled(&self) -> usize {
        self.finalized
            + self.unchanged
            + self.deferred
            + self.rate_limit_exhausted
            + self.rejected
            + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}
