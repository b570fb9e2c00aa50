//! Postgres-backed stores.
//!
//! The withdrawal check-and-write runs in one transaction that first takes
//! `pg_advisory_xact_lock(user_id)`, so concurrent debits of the same user
//! serialize across every process sharing the database while debits of other
//! users proceed. The lock is released by commit or rollback.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{DebitTransaction, LedgerStore, OrderStore, StoreError, StoreResult};
use crate::constants::database::{NUMERIC_VALUE_OUT_OF_RANGE, UNIQUE_VIOLATION};
use crate::models::order::OrderRow;
use crate::models::{Order, OrderStatus, Withdrawal};

const ORDER_COLUMNS: &str = "id, user_id, number, status, accrual, uploaded_at";
const WITHDRAWAL_COLUMNS: &str = "id, user_id, order_number, amount, processed_at";

const ACCRUED_TOTAL_SQL: &str = r#"
    SELECT COALESCE(SUM(accrual), 0)::BIGINT
    FROM orders
    WHERE user_id = $1 AND status = 'PROCESSED'
"#;

const WITHDRAWN_TOTAL_SQL: &str = r#"
    SELECT COALESCE(SUM(amount), 0)::BIGINT
    FROM withdrawals
    WHERE user_id = $1
"#;

fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, UNIQUE_VIOLATION)
}

/// `SUM` is computed as NUMERIC; the `::BIGINT` cast fails out of range
fn total_error(err: sqlx::Error, user_id: i64) -> StoreError {
    if has_sqlstate(&err, NUMERIC_VALUE_OUT_OF_RANGE) {
        StoreError::BalanceOverflow { user_id }
    } else {
        StoreError::Database(err)
    }
}

async fn fetch_total<'e, E>(executor: E, sql: &str, user_id: i64) -> StoreResult<i64>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i64>(sql)
        .bind(user_id)
        .fetch_one(executor)
        .await
        .map_err(|e| total_error(e, user_id))
}

fn into_order(row: OrderRow) -> StoreResult<Order> {
    Order::try_from(row).map_err(StoreError::Corrupt)
}

/// `orders` table access
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn list_pending_numbers(&self) -> StoreResult<Vec<String>> {
        let numbers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT number
            FROM orders
            WHERE status = $1
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .bind(OrderStatus::New.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }

    async fn find_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_order).transpose()
    }

    async fn create_order(&self, user_id: i64, number: &str) -> StoreResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, number, status) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(number)
        .bind(OrderStatus::New.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::OrderNumberTaken {
                    number: number.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        into_order(row)
    }

    async fn list_orders(&self, user_id: i64) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY uploaded_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_order).collect()
    }

    async fn apply_final_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, accrual = $2
            WHERE number = $3
              AND (status NOT IN ('INVALID', 'PROCESSED')
                   OR (status = $1 AND accrual IS NOT DISTINCT FROM $2))
            "#,
        )
        .bind(status.as_str())
        .bind(accrual)
        .bind(number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(match self.find_by_number(number).await? {
                Some(stored) => StoreError::VerdictConflict {
                    number: number.to_string(),
                    stored_status: stored.status,
                    stored_accrual: stored.accrual,
                },
                None => StoreError::OrderNotFound {
                    number: number.to_string(),
                },
            });
        }

        debug!(order_number = %number, status = %status, accrual = ?accrual, "Stored accrual verdict");
        Ok(())
    }
}

/// Balance aggregates and `withdrawals` table access
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn accrued_total(&self, user_id: i64) -> StoreResult<i64> {
        fetch_total(&self.pool, ACCRUED_TOTAL_SQL, user_id).await
    }

    async fn withdrawn_total(&self, user_id: i64) -> StoreResult<i64> {
        fetch_total(&self.pool, WITHDRAWN_TOTAL_SQL, user_id).await
    }

    async fn list_withdrawals(&self, user_id: i64) -> StoreResult<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = $1 ORDER BY processed_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    async fn begin_debit(&self, user_id: i64) -> StoreResult<Box<dyn DebitTransaction>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgDebitTransaction { tx, user_id }))
    }
}

/// Open debit holding the user's advisory transaction lock
pub struct PgDebitTransaction {
    tx: Transaction<'static, Postgres>,
    user_id: i64,
}

#[async_trait]
impl DebitTransaction for PgDebitTransaction {
    fn user_id(&self) -> i64 {
        self.user_id
    }

    async fn accrued_total(&mut self) -> StoreResult<i64> {
        fetch_total(&mut *self.tx, ACCRUED_TOTAL_SQL, self.user_id).await
    }

    async fn withdrawn_total(&mut self) -> StoreResult<i64> {
        fetch_total(&mut *self.tx, WITHDRAWN_TOTAL_SQL, self.user_id).await
    }

    async fn insert_withdrawal(
        &mut self,
        order_number: &str,
        amount: i64,
    ) -> StoreResult<Withdrawal> {
        let user_id = self.user_id;
        sqlx::query_as::<_, Withdrawal>(&format!(
            "INSERT INTO withdrawals (user_id, order_number, amount) VALUES ($1, $2, $3) RETURNING {WITHDRAWAL_COLUMNS}"
        ))
        .bind(user_id)
        .bind(order_number)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateWithdrawalOrder {
                    user_id,
                    order_number: order_number.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
