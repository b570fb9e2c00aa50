use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::log_ledger_operation;
use crate::models::{Balance, Withdrawal};
use crate::persistence::{LedgerStore, StoreError};
use crate::validation::{normalize_order_number, validate_withdrawal_amount, ValidationError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Insufficient funds for user {user_id}: {available} available, {requested} requested")]
    InsufficientFunds {
        user_id: i64,
        available: i64,
        requested: i64,
    },

    #[error("Withdrawal against order {order_number} already recorded for user {user_id}")]
    DuplicateWithdrawalOrder { user_id: i64, order_number: String },

    #[error("Balance of user {user_id} exceeds the supported range")]
    BalanceOverflow { user_id: i64 },

    #[error("Ledger store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateWithdrawalOrder {
                user_id,
                order_number,
            } => LedgerError::DuplicateWithdrawalOrder {
                user_id,
                order_number,
            },
            StoreError::BalanceOverflow { user_id } => LedgerError::BalanceOverflow { user_id },
            other => LedgerError::Store(other),
        }
    }
}

impl LedgerError {
    /// Expected refusals, as opposed to validation or infrastructure failures
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::DuplicateWithdrawalOrder { .. }
        )
    }
}

/// Balance reads and withdrawals for every user
#[derive(Clone)]
pub struct BalanceLedger {
    store: Arc<dyn LedgerStore>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance and total withdrawn; either aggregate failing fails the call
    pub async fn get_balance(&self, user_id: i64) -> Result<Balance, LedgerError> {
        let (accrued, withdrawn) = tokio::try_join!(
            self.store.accrued_total(user_id),
            self.store.withdrawn_total(user_id)
        )?;
        Balance::from_totals(accrued, withdrawn).ok_or(LedgerError::BalanceOverflow { user_id })
    }

    /// Debit `amount` from `user_id`, recording it against `order_number`
    ///
    /// Nothing is written unless the balance recomputed under the user's
    /// exclusive section covers the amount.
    pub async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: i64,
    ) -> Result<Withdrawal, LedgerError> {
        let order_number = normalize_order_number(order_number)?;
        validate_withdrawal_amount(amount)?;

        let mut debit = self.store.begin_debit(user_id).await?;
        let accrued = debit.accrued_total().await?;
        let withdrawn = debit.withdrawn_total().await?;
        let balance = Balance::from_totals(accrued, withdrawn)
            .ok_or(LedgerError::BalanceOverflow { user_id })?;

        if !balance.covers(amount) {
            debug!(
                user_id = user_id,
                available = balance.current,
                requested = amount,
                "Withdrawal refused"
            );
            log_ledger_operation(
                "withdraw",
                user_id,
                Some(&order_number),
                Some(amount),
                "insufficient_funds",
                None,
            );
            return Err(LedgerError::InsufficientFunds {
                user_id,
                available: balance.current,
                requested: amount,
            });
        }

        let withdrawal = match debit.insert_withdrawal(&order_number, amount).await {
            Ok(withdrawal) => withdrawal,
            Err(e) => {
                let err = LedgerError::from(e);
                if err.is_business_outcome() {
                    warn!(user_id = user_id, order_number = %order_number, "Duplicate withdrawal");
                }
                return Err(err);
            }
        };
        debit.commit().await?;

        log_ledger_operation(
            "withdraw",
            user_id,
            Some(&order_number),
            Some(amount),
            "committed",
            None,
        );
        Ok(withdrawal)
    }

    /// Withdrawals of `user_id`, newest first
    pub async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>, LedgerError> {
        Ok(self.store.list_withdrawals(user_id).await?)
    }
}
