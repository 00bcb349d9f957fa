//! Execution engine: state machine, deadline enforcement, reconciliation.

mod engine;
mod reconciliation;
mod timeout;

pub use engine::ExecutionEngine;
pub use reconciliation::{ComparedField, ReconciliationReport, ReconciliationService};
pub use timeout::TimeoutController;
