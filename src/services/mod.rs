//! # Services
//!
//! Entry points consumed by the HTTP layer and the reconciliation worker:
//! order submission and accrual application ([`OrderService`]) and the balance
//! ledger ([`BalanceLedger`]), bundled in [`LoyaltyServices`].

pub mod order_service;

pub use order_service::{OrderError, OrderService, SubmitOutcome};

use sqlx::PgPool;
use std::sync::Arc;

use crate::ledger::BalanceLedger;
use crate::persistence::{MemoryStore, PgLedgerStore, PgOrderStore};

/// Every service, wired to one backing store
#[derive(Clone)]
pub struct LoyaltyServices {
    pub orders: OrderService,
    pub ledger: BalanceLedger,
}

impl LoyaltyServices {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            orders: OrderService::new(Arc::new(PgOrderStore::new(pool.clone()))),
            ledger: BalanceLedger::new(Arc::new(PgLedgerStore::new(pool))),
        }
    }

    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            orders: OrderService::new(Arc::new(store.clone())),
            ledger: BalanceLedger::new(Arc::new(store)),
        }
    }
}
