use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state_machine::OrderStatus;

/// Body of a 200 response from `GET /api/orders/{number}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<i64>,
}

/// Everything a single accrual query can produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// The service has a status (and possibly an amount) for the order
    Resolved {
        status: OrderStatus,
        accrual: Option<i64>,
    },
    /// The service has never heard of the order; treated as permanently invalid
    NotRegistered,
    /// Do not ask again before `retry_after` has elapsed
    RateLimited { retry_after: Duration },
    /// Anything else: network failure, timeout, server error, malformed body
    Transient { reason: String },
}

impl AccrualOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn rate_limited_secs(secs: u64) -> Self {
        Self::RateLimited {
            retry_after: Duration::from_secs(secs),
        }
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::NotRegistered => "not_registered",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
        }
    }
}

impl From<AccrualResponse> for AccrualOutcome {
    fn from(response: AccrualResponse) -> Self {
        Self::Resolved {
            status: response.status,
            accrual: response.accrual,
        }
    }
}
