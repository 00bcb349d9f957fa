//! Execution lifecycle types: stages, attempts, and the flow record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FrozenSnapshot;

/// Lifecycle stage of one execution flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStage {
    /// Flow created, nothing frozen yet.
    Created,
    /// Snapshot frozen; parameters are now immutable for this flow.
    SnapshotFrozen,
    /// Submission to the broker in progress.
    Submitting,
    /// Broker acknowledged the order; awaiting fill, cancel, or timeout.
    Pending,
    /// Order completely filled.
    Filled,
    /// Order partially filled.
    PartiallyFilled,
    /// Order cancelled (kill switch tripped while pending).
    Cancelled,
    /// Deadline elapsed without a terminal broker outcome.
    TimedOut,
    /// Reconciliation against the broker matched; flow complete.
    Reconciled,
    /// Reconciliation mismatch or unresolvable state; operator must review.
    ManualReview,
    /// Flow aborted before any fill.
    Aborted,
}

impl ExecutionStage {
    /// Returns true if the flow can make no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Reconciled | Self::ManualReview | Self::Aborted)
    }

    /// Returns true if a fill was confirmed at or before this stage.
    #[must_use]
    pub const fn is_filled(&self) -> bool {
        matches!(self, Self::Filled | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::SnapshotFrozen => "SNAPSHOT_FROZEN",
            Self::Submitting => "SUBMITTING",
            Self::Pending => "PENDING",
            Self::Filled => "FILLED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Cancelled => "CANCELLED",
            Self::TimedOut => "TIMED_OUT",
            Self::Reconciled => "RECONCILED",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{name}")
    }
}

/// Status of a single submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// Attempt sent, no broker response yet.
    InFlight,
    /// Broker acknowledged the order.
    Acknowledged,
    /// Broker rejected the submission.
    Rejected,
}

/// One submission try against the broker.
///
/// Attempts are append-only and ordered by sequence number; every attempt in
/// a flow is placed from the same frozen snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    /// 1-based attempt sequence number.
    pub sequence: u32,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Broker order ID, once acknowledged.
    pub broker_order_id: Option<String>,
    /// Attempt status.
    pub status: AttemptStatus,
    /// Broker error text for rejected attempts.
    pub error: Option<String>,
}

/// Why a flow ended `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    /// Kill switch already tripped before any broker call.
    KillSwitchBefore,
    /// Broker error that is not retryable.
    BrokerError,
    /// Retry budget exhausted before acknowledgment.
    MaxAttemptsExhausted,
    /// Execution window elapsed before any acknowledgment.
    SubmissionWindowElapsed,
    /// The handed-in guardrail result was not an approval.
    NotApproved,
}

impl AbortReason {
    /// Stable reason string for audit payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KillSwitchBefore => "KILL_SWITCH_BEFORE",
            Self::BrokerError => "BROKER_ERROR",
            Self::MaxAttemptsExhausted => "MAX_ATTEMPTS_EXHAUSTED",
            Self::SubmissionWindowElapsed => "SUBMISSION_WINDOW_ELAPSED",
            Self::NotApproved => "NOT_APPROVED",
        }
    }
}

/// Record of a kill-switch trip observed during a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchInteraction {
    /// Which checkpoint observed the trip.
    pub checkpoint: KillSwitchCheckpoint,
    /// Stage the flow was in when the trip was observed.
    pub observed_at_stage: ExecutionStage,
    /// Observation timestamp.
    pub observed_at: DateTime<Utc>,
}

/// The three kill-switch checkpoints of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchCheckpoint {
    /// Before any broker call: abort, submit nothing.
    Before,
    /// While pending: best-effort cancel.
    During,
    /// After a confirmed fill: log only, position stays open.
    After,
}

/// Outcome of the one-shot broker reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Local and broker records agree.
    Match,
    /// Records disagree; flow is forced to manual review.
    Mismatch,
}

/// Confirmed fill details captured from the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillDetails {
    /// Actual fill price reported by the broker.
    pub fill_price: Decimal,
    /// Actual filled quantity.
    pub fill_quantity: Decimal,
    /// Stop-loss computed from the actual fill price.
    pub stop_loss: Decimal,
    /// Take-profit computed from the actual fill price.
    pub take_profit: Decimal,
    /// When the fill was observed locally.
    pub observed_at: DateTime<Utc>,
    /// Whether the fill arrived after the execution deadline.
    pub late: bool,
}

/// The full record of one execution flow.
///
/// Exclusively owns its snapshot and attempt list; shared state
/// (kill switches, counters, audit log) is referenced by the engine, not
/// stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Correlation ID tying together all audit entries of this flow.
    pub correlation_id: Uuid,
    /// Current (finally: terminal) stage.
    pub stage: ExecutionStage,
    /// The frozen snapshot this flow executed from.
    pub snapshot: FrozenSnapshot,
    /// Ordered submission attempts.
    pub attempts: Vec<ExecutionAttempt>,
    /// Fill details once a fill is confirmed.
    pub fill: Option<FillDetails>,
    /// Abort reason, if the flow aborted.
    pub abort_reason: Option<AbortReason>,
    /// Kill-switch trips observed during the flow.
    pub kill_switch_interactions: Vec<KillSwitchInteraction>,
    /// Reconciliation outcome; also the idempotency flag - once `Some`,
    /// reconciliation never runs again for this flow.
    pub reconciliation: Option<crate::execution::ReconciliationReport>,
    /// Flow creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Create a new flow record in the `Created` stage.
    #[must_use]
    pub fn new(snapshot: FrozenSnapshot) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            stage: ExecutionStage::Created,
            snapshot,
            attempts: Vec::new(),
            fill: None,
            abort_reason: None,
            kill_switch_interactions: Vec::new(),
            reconciliation: None,
            created_at: Utc::now(),
        }
    }

    /// Broker order ID of the acknowledged attempt, if any.
    #[must_use]
    pub fn broker_order_id(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.broker_order_id.as_deref())
    }

    /// Sequence number for the next submission attempt.
    #[must_use]
    pub fn next_attempt_sequence(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }
}
