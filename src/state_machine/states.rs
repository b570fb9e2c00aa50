use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status as stored and as reported by the accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Initial state when the order is submitted
    New,
    /// Accrual service accepted the order but has not started on it
    Registered,
    /// Accrual service is computing the reward
    Processing,
    /// Accrual service rejected the order; no reward
    Invalid,
    /// Reward computed; counts toward the owner's balance
    Processed,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    /// Check if orders in this state are polled by the reconciliation worker
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::New)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Registered => "REGISTERED",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "REGISTERED" => Ok(Self::Registered),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

/// Default state for new orders
impl Default for OrderStatus {
    fn default() -> Self {
        Self::New
    }
}
