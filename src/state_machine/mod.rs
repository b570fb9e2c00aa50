// State machine for order accrual status
//
// Decides whether a verdict from the accrual service changes a stored order.
// Pure logic: persistence happens in the order service.

pub mod errors;
pub mod order_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use order_state_machine::{OrderStatusMachine, Transition};
pub use states::OrderStatus;
