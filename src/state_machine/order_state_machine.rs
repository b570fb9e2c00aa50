use super::{
    errors::{StateMachineError, StateMachineResult},
    states::OrderStatus,
};
use crate::models::Order;
use crate::validation::validate_accrual;

/// What applying an accrual verdict does to a stored order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No final verdict yet; the order is not written and stays pending
    Unchanged { reported: OrderStatus },
    /// Write the terminal status, and the accrual for `Processed`
    Finalize {
        status: OrderStatus,
        accrual: Option<i64>,
    },
}

impl Transition {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Finalize { .. })
    }
}

/// Pure decision logic for accrual verdicts
///
/// `New` (and the legacy `Registered`/`Processing` stored states) move to
/// `Invalid` or `Processed` exactly once. Re-applying the verdict an order
/// already holds produces a value-equal write, so the derived balance never
/// double-counts. A different verdict for a terminal order is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStatusMachine;

impl OrderStatusMachine {
    pub fn new() -> Self {
        Self
    }

    /// Decide how the verdict `(reported, accrual)` changes `order`
    pub fn decide(
        &self,
        order: &Order,
        reported: OrderStatus,
        accrual: Option<i64>,
    ) -> StateMachineResult<Transition> {
        self.determine_transition(order.status, order.accrual, reported, accrual)
    }

    /// Verdict for an order the accrual service has never heard of
    pub fn decide_not_registered(&self, order: &Order) -> StateMachineResult<Transition> {
        self.decide(order, OrderStatus::Invalid, None)
    }

    fn determine_transition(
        &self,
        current: OrderStatus,
        current_accrual: Option<i64>,
        reported: OrderStatus,
        accrual: Option<i64>,
    ) -> StateMachineResult<Transition> {
        validate_accrual(accrual)?;

        let target_accrual = match reported {
            OrderStatus::New => {
                return Err(StateMachineError::InvalidTransition {
                    from: current,
                    to: reported,
                })
            }
            OrderStatus::Registered | OrderStatus::Processing => {
                return Ok(Transition::Unchanged { reported });
            }
            OrderStatus::Processed => accrual,
            OrderStatus::Invalid => None,
        };

        if current.is_terminal() && (current != reported || current_accrual != target_accrual) {
            return Err(StateMachineError::TerminalConflict {
                stored_status: current,
                stored_accrual: current_accrual,
                reported_status: reported,
                reported_accrual: accrual,
            });
        }

        Ok(Transition::Finalize {
            status: reported,
            accrual: target_accrual,
        })
    }
}
