use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::log_order_operation;
use crate::models::{Order, OrderStatus};
use crate::persistence::{OrderStore, StoreError};
use crate::state_machine::{OrderStatusMachine, StateMachineError, Transition};
use crate::validation::{normalize_order_number, validate_accrual, ValidationError};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Order {number} not found")]
    NotFound { number: String },

    #[error("Order {number} was already submitted by another user")]
    OwnedByAnotherUser { number: String },

    #[error("Accrual verdict rejected for order {number}: {source}")]
    StateMachine {
        number: String,
        #[source]
        source: StateMachineError,
    },

    #[error("Order store failure: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Infrastructure failures worth retrying on a later pass
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result of submitting an order number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First submission; the order was created as `New`
    Accepted(Order),
    /// The same user submitted this number before; nothing changed
    AlreadySubmitted(Order),
}

impl SubmitOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Accepted(order) | Self::AlreadySubmitted(order) => order,
        }
    }
}

/// Order submission, listing, and accrual application
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    machine: OrderStatusMachine,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            machine: OrderStatusMachine::new(),
        }
    }

    /// Register `raw_number` for `user_id`
    pub async fn submit_order(
        &self,
        user_id: i64,
        raw_number: &str,
    ) -> Result<SubmitOutcome, OrderError> {
        let number = normalize_order_number(raw_number)?;

        if let Some(existing) = self.store.find_by_number(&number).await? {
            return Self::resolve_existing(user_id, existing);
        }

        match self.store.create_order(user_id, &number).await {
            Ok(order) => {
                log_order_operation("submit", &number, Some(user_id), "accepted", None);
                Ok(SubmitOutcome::Accepted(order))
            }
            // Lost an insert race; the winner decides ownership
            Err(StoreError::OrderNumberTaken { .. }) => {
                let existing = self
                    .store
                    .find_by_number(&number)
                    .await?
                    .ok_or_else(|| OrderError::NotFound {
                        number: number.clone(),
                    })?;
                Self::resolve_existing(user_id, existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_existing(user_id: i64, existing: Order) -> Result<SubmitOutcome, OrderError> {
        if existing.user_id == user_id {
            Ok(SubmitOutcome::AlreadySubmitted(existing))
        } else {
            warn!(
                order_number = %existing.number,
                user_id = user_id,
                "Order number already owned by another user"
            );
            Err(OrderError::OwnedByAnotherUser {
                number: existing.number,
            })
        }
    }

    /// Orders of `user_id`, newest first
    pub async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders(user_id).await?)
    }

    /// Numbers the reconciliation worker should poll, oldest first
    pub async fn get_pending_orders(&self) -> Result<Vec<String>, OrderError> {
        Ok(self.store.list_pending_numbers().await?)
    }

    /// Apply an accrual verdict to the stored order
    ///
    /// Non-terminal verdicts leave the order untouched. Terminal verdicts are
    /// written once; repeating the same verdict rewrites identical values.
    /// The store re-checks the stored verdict at write time, so concurrent
    /// callers with different verdicts cannot both succeed.
    pub async fn apply_accrual_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> Result<Transition, OrderError> {
        validate_accrual(accrual).map_err(|e| OrderError::StateMachine {
            number: number.to_string(),
            source: e.into(),
        })?;

        let order = self.load(number).await?;
        let transition = self
            .machine
            .decide(&order, status, accrual)
            .map_err(|source| OrderError::StateMachine {
                number: number.to_string(),
                source,
            })?;

        self.persist(number, transition).await?;
        Ok(transition)
    }

    /// The accrual service does not know `number`: finalize it as `Invalid`
    pub async fn apply_not_registered(&self, number: &str) -> Result<Transition, OrderError> {
        let order = self.load(number).await?;
        let transition = self
            .machine
            .decide_not_registered(&order)
            .map_err(|source| OrderError::StateMachine {
                number: number.to_string(),
                source,
            })?;

        self.persist(number, transition).await?;
        Ok(transition)
    }

    async fn load(&self, number: &str) -> Result<Order, OrderError> {
        self.store
            .find_by_number(number)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                number: number.to_string(),
            })
    }

    async fn persist(&self, number: &str, transition: Transition) -> Result<(), OrderError> {
        match transition {
            Transition::Unchanged { reported } => {
                debug!(order_number = %number, reported = %reported, "Verdict not final; order left untouched");
                Ok(())
            }
            Transition::Finalize { status, accrual } => {
                self.store
                    .apply_final_result(number, status, accrual)
                    .await
                    .map_err(|e| match e {
                        StoreError::OrderNotFound { number } => OrderError::NotFound { number },
                        // Another writer finalized the order after our read
                        StoreError::VerdictConflict {
                            number,
                            stored_status,
                            stored_accrual,
                        } => OrderError::StateMachine {
                            number,
                            source: StateMachineError::TerminalConflict {
                                stored_status,
                                stored_accrual,
                                reported_status: status,
                                reported_accrual: accrual,
                            },
                        },
                        other => OrderError::Store(other),
                    })?;
                log_order_operation(
                    "apply_accrual",
                    number,
                    None,
                    status.as_str(),
                    accrual.map(|a| format!("accrual={a}")).as_deref(),
                );
                Ok(())
            }
        }
    }
}
