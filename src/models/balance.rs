use serde::{Deserialize, Serialize};

/// Derived balance of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    /// Processed accruals minus everything withdrawn
    pub current: i64,
    /// Sum of all withdrawals
    pub withdrawn: i64,
}

impl Balance {
    /// `None` when the difference does not fit in an `i64`
    pub fn from_totals(accrued: i64, withdrawn: i64) -> Option<Self> {
        Some(Self {
            current: accrued.checked_sub(withdrawn)?,
            withdrawn,
        })
    }

    pub fn covers(&self, amount: i64) -> bool {
        self.current >= amount
    }
}
