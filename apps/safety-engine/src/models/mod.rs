//! Core domain models for the safety engine.
//!
//! These types define the data structures for trade intents, guardrail
//! verdicts, and execution flow state.

mod execution;
mod guardrail;
mod intent;
mod mode;

pub use execution::{
    AbortReason, AttemptStatus, ExecutionAttempt, ExecutionResult, ExecutionStage, FillDetails,
    KillSwitchCheckpoint, KillSwitchInteraction, ReconciliationStatus,
};
pub use guardrail::{
    CheckName, CheckOutcome, CountersSnapshot, DenyReason, GuardrailCheckResult, GuardrailVerdict,
};
pub use intent::{FrozenSnapshot, OrderSide, TradeIntent};
pub use mode::TradingMode;
