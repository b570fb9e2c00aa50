use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Points debited from a user's balance against an order number
/// Maps to `withdrawals` table; (user_id, order_number) is unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    /// Supplied by the requester; need not be an order the system tracks
    pub order_number: String,
    pub amount: i64,
    pub processed_at: DateTime<Utc>,
}
