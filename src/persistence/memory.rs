//! In-process store with the same contracts as the Postgres stores.
//!
//! Tables live behind a `parking_lot::RwLock`; debits serialize per user
//! through a [`UserLockTable`] and stage their writes until commit.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use super::{
    DebitTransaction, LedgerStore, OrderStore, StoreError, StoreResult, UserLockGuard,
    UserLockTable,
};
use crate::models::{Order, OrderStatus, Withdrawal};

fn checked_total(user_id: i64, amounts: impl IntoIterator<Item = i64>) -> StoreResult<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or(StoreError::BalanceOverflow { user_id })
}

#[derive(Debug, Default)]
struct Tables {
    orders: Vec<Order>,
    withdrawals: Vec<Withdrawal>,
}

impl Tables {
    fn accrued_total(&self, user_id: i64) -> StoreResult<i64> {
        checked_total(
            user_id,
            self.orders
                .iter()
                .filter(|o| o.user_id == user_id)
                .map(Order::credited_amount),
        )
    }

    fn withdrawn_total(&self, user_id: i64) -> StoreResult<i64> {
        checked_total(
            user_id,
            self.withdrawals
                .iter()
                .filter(|w| w.user_id == user_id)
                .map(|w| w.amount),
        )
    }

    fn has_withdrawal(&self, user_id: i64, order_number: &str) -> bool {
        self.withdrawals
            .iter()
            .any(|w| w.user_id == user_id && w.order_number == order_number)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: RwLock<Tables>,
    locks: UserLockTable,
    next_order_id: AtomicI64,
    next_withdrawal_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryState {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

/// Cloneable handle; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert an order in an arbitrary state, bypassing submission rules
    pub fn seed_order(
        &self,
        user_id: i64,
        number: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> Order {
        let order = Order {
            id: self.state.next_order_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            number: number.to_string(),
            status,
            accrual,
            uploaded_at: Utc::now(),
        };
        self.state.tables.write().orders.push(order.clone());
        order
    }

    /// Snapshot of a stored order
    pub fn order(&self, number: &str) -> Option<Order> {
        self.state
            .tables
            .read()
            .orders
            .iter()
            .find(|o| o.number == number)
            .cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn list_pending_numbers(&self) -> StoreResult<Vec<String>> {
        self.state.check_available()?;
        let tables = self.state.tables.read();
        let mut pending: Vec<&Order> = tables.orders.iter().filter(|o| o.is_pending()).collect();
        pending.sort_by_key(|o| (o.uploaded_at, o.id));
        Ok(pending.into_iter().map(|o| o.number.clone()).collect())
    }

    async fn find_by_number(&self, number: &str) -> StoreResult<Option<Order>> {
        self.state.check_available()?;
        Ok(self.order(number))
    }

    async fn create_order(&self, user_id: i64, number: &str) -> StoreResult<Order> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write();
        if tables.orders.iter().any(|o| o.number == number) {
            return Err(StoreError::OrderNumberTaken {
                number: number.to_string(),
            });
        }

        let order = Order {
            id: self.state.next_order_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            number: number.to_string(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        };
        tables.orders.push(order.clone());
        Ok(order)
    }

    async fn list_orders(&self, user_id: i64) -> StoreResult<Vec<Order>> {
        self.state.check_available()?;
        let tables = self.state.tables.read();
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.uploaded_at, b.id).cmp(&(a.uploaded_at, a.id)));
        Ok(orders)
    }

    async fn apply_final_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> StoreResult<()> {
        self.state.check_available()?;
        let mut tables = self.state.tables.write();
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.number == number)
            .ok_or_else(|| StoreError::OrderNotFound {
                number: number.to_string(),
            })?;
        let conflicting =
            order.status.is_terminal() && (order.status != status || order.accrual != accrual);
        if conflicting {
            return Err(StoreError::VerdictConflict {
                number: number.to_string(),
                stored_status: order.status,
                stored_accrual: order.accrual,
            });
        }
        order.status = status;
        order.accrual = accrual;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn accrued_total(&self, user_id: i64) -> StoreResult<i64> {
        self.state.check_available()?;
        self.state.tables.read().accrued_total(user_id)
    }

    async fn withdrawn_total(&self, user_id: i64) -> StoreResult<i64> {
        self.state.check_available()?;
        self.state.tables.read().withdrawn_total(user_id)
    }

    async fn list_withdrawals(&self, user_id: i64) -> StoreResult<Vec<Withdrawal>> {
        self.state.check_available()?;
        let tables = self.state.tables.read();
        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| (b.processed_at, b.id).cmp(&(a.processed_at, a.id)));
        Ok(withdrawals)
    }

    async fn begin_debit(&self, user_id: i64) -> StoreResult<Box<dyn DebitTransaction>> {
        self.state.check_available()?;
        let guard = self.state.locks.lock(user_id).await;
        Ok(Box::new(MemoryDebitTransaction {
            state: self.state.clone(),
            user_id,
            staged: Vec::new(),
            _guard: guard,
        }))
    }
}

/// Open debit holding the user's section; staged rows land on commit
struct MemoryDebitTransaction {
    state: Arc<MemoryState>,
    user_id: i64,
    staged: Vec<Withdrawal>,
    _guard: UserLockGuard,
}

#[async_trait]
impl DebitTransaction for MemoryDebitTransaction {
    fn user_id(&self) -> i64 {
        self.user_id
    }

    async fn accrued_total(&mut self) -> StoreResult<i64> {
        self.state.check_available()?;
        self.state.tables.read().accrued_total(self.user_id)
    }

    async fn withdrawn_total(&mut self) -> StoreResult<i64> {
        self.state.check_available()?;
        let committed = self.state.tables.read().withdrawn_total(self.user_id)?;
        checked_total(
            self.user_id,
            std::iter::once(committed).chain(self.staged.iter().map(|w| w.amount)),
        )
    }

    async fn insert_withdrawal(
        &mut self,
        order_number: &str,
        amount: i64,
    ) -> StoreResult<Withdrawal> {
        self.state.check_available()?;
        let duplicate = self.staged.iter().any(|w| w.order_number == order_number)
            || self
                .state
                .tables
                .read()
                .has_withdrawal(self.user_id, order_number);
        if duplicate {
            return Err(StoreError::DuplicateWithdrawalOrder {
                user_id: self.user_id,
                order_number: order_number.to_string(),
            });
        }

        let withdrawal = Withdrawal {
            id: self.state.next_withdrawal_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: self.user_id,
            order_number: order_number.to_string(),
            amount,
            processed_at: Utc::now(),
        };
        self.staged.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.state.check_available()?;
        let mut this = *self;
        this.state
            .tables
            .write()
            .withdrawals
            .append(&mut this.staged);
        Ok(())
    }
}
