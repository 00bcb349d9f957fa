// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Safety Engine - Rust Core Library
//!
//! Trade execution safety engine: a pre-flight guardrail gate feeding an
//! order-execution state machine that drives a single trade intent from
//! approval to a reconciled terminal outcome against a broker adapter.
//!
//! # Components
//!
//! - [`safety`]: shared kill switches and daily counters
//! - [`guardrail`]: ordered, short-circuiting pre-flight checks
//! - [`execution`]: the per-trade state machine, deadline enforcement, and
//!   one-shot broker reconciliation
//! - [`broker`]: the broker capability trait, retry policy, and the paper
//!   (simulated) adapter
//! - [`audit`]: append-only forensic record of every decision and transition
//!
//! # Safety invariants
//!
//! - The frozen snapshot never changes after approval; retries and SL/TP
//!   math read from that one copy.
//! - SL/TP derive from the actual fill price, never the reference price.
//! - Kill switches are honored BEFORE (abort, no broker call), DURING
//!   (best-effort cancel, racing fills still win), and AFTER (log only).
//! - Reconciliation runs at most once per flow; any mismatch forces manual
//!   review with no automatic correction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Append-only audit log.
pub mod audit;

/// Broker capability contract and adapters.
pub mod broker;

/// Configuration loading and validation.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Execution engine and its supporting services.
pub mod execution;

/// Pre-flight guardrail gate.
pub mod guardrail;

/// Core domain models.
pub mod models;

/// Shared safety state: kill switches and daily counters.
pub mod safety;

/// Tracing setup.
pub mod telemetry;

pub use audit::{AuditEntry, AuditLog};
pub use broker::{
    BrokerAdapter, BrokerError, BrokerOrderSnapshot, BrokerOrderStatus, OrderAck, PaperBroker,
    PaperBrokerConfig, RetryPolicy,
};
pub use config::{Config, ConfigError, ExecutionConfig, GuardrailLimits, load_config};
pub use error::EngineError;
pub use execution::{ExecutionEngine, ReconciliationReport, ReconciliationService, TimeoutController};
pub use guardrail::GuardrailController;
pub use models::{
    AbortReason, DenyReason, ExecutionResult, ExecutionStage, FrozenSnapshot,
    GuardrailCheckResult, GuardrailVerdict, OrderSide, ReconciliationStatus, TradeIntent,
    TradingMode,
};
pub use safety::{DailyCounters, KillSwitchManager, KillSwitchScope};
