use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::state_machine::OrderStatus;

/// Order submitted by a user for accrual
/// Maps to `orders` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub number: String,
    pub status: OrderStatus,
    /// Minor currency units; set only once the order is `Processed`
    pub accrual: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// Amount this order contributes to its owner's balance
    pub fn credited_amount(&self) -> i64 {
        match self.status {
            OrderStatus::Processed => self.accrual.unwrap_or(0),
            _ => 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }
}

/// Raw `orders` row; status is stored as text
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub number: String,
    pub status: String,
    pub accrual: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = String;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            number: row.number,
            status: row.status.parse()?,
            accrual: row.accrual,
            uploaded_at: row.uploaded_at,
        })
    }
}
