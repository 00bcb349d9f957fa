//! Error taxonomy for the safety engine.
//!
//! The two hot paths never raise: a guardrail denial is a
//! [`GuardrailCheckResult`](crate::models::GuardrailCheckResult) value and
//! the execution engine always returns a terminal
//! [`ExecutionResult`](crate::models::ExecutionResult), degrading internal
//! faults to `Aborted` or `ManualReview`. `EngineError` covers the fallible
//! surface around them: configuration and wiring.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;

/// Top-level error for the safety engine's fallible surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A broker call failed outside an execution flow (e.g. a standalone
    /// health probe at startup).
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A trade intent reached the engine without a guardrail approval.
    #[error("Trade intent {approval_id} was not approved: {reason}")]
    NotApproved {
        /// Approval ID of the rejected intent.
        approval_id: uuid::Uuid,
        /// Denial reason string.
        reason: String,
    },
}
