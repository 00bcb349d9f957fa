//! Guardrail verdicts and check outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verdict of a guardrail evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailVerdict {
    /// Trade may proceed; counters were provisionally reserved.
    Allow,
    /// Trade denied; `deny_reason` names the first failing check.
    Deny,
}

/// Reason code for a guardrail denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Global kill switch is tripped.
    GlobalKillSwitch,
    /// Symbol-scoped kill switch is tripped.
    SymbolKillSwitch,
    /// Intent mode diverges from the configured system mode.
    ModeMismatch,
    /// Broker health probe failed or errored (fail-closed).
    BrokerUnhealthy,
    /// Daily trade count limit reached.
    DailyMaxTrades,
    /// Per-symbol trade count limit reached.
    SymbolMaxTrades,
    /// Cumulative daily loss limit reached.
    DailyMaxLoss,
}

impl DenyReason {
    /// Stable reason string for audit payloads and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalKillSwitch => "GLOBAL_KILL_SWITCH",
            Self::SymbolKillSwitch => "SYMBOL_KILL_SWITCH",
            Self::ModeMismatch => "MODE_MISMATCH",
            Self::BrokerUnhealthy => "BROKER_UNHEALTHY",
            Self::DailyMaxTrades => "DAILY_MAX_TRADES",
            Self::SymbolMaxTrades => "SYMBOL_MAX_TRADES",
            Self::DailyMaxLoss => "DAILY_MAX_LOSS",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Name of one guardrail check, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    /// Check 1: global kill switch.
    GlobalKillSwitch,
    /// Check 2: symbol kill switch.
    SymbolKillSwitch,
    /// Check 3: intent mode matches system mode.
    ModeMatch,
    /// Check 4: broker health probe.
    BrokerHealth,
    /// Check 5: daily trade count limit.
    DailyTradeLimit,
    /// Check 6: per-symbol trade count limit.
    SymbolTradeLimit,
    /// Check 7: daily loss limit.
    DailyLossLimit,
}

/// Outcome of one evaluated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Which check ran.
    pub check: CheckName,
    /// Whether it passed.
    pub passed: bool,
}

/// Snapshot of the daily counters as used for one guardrail decision.
///
/// Captured inside the same critical section as the limit checks so the
/// decision can be replayed forensically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// UTC day the counters belong to.
    pub day: chrono::NaiveDate,
    /// Total trades counted today (before this reservation).
    pub total_trades: u32,
    /// Trades counted today for the evaluated symbol (before this reservation).
    pub symbol_trades: u32,
    /// Cumulative realized P&L for the day.
    pub realized_pnl: Decimal,
}

/// Result of a guardrail evaluation. Denial is a value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailCheckResult {
    /// Allow or deny.
    pub verdict: GuardrailVerdict,
    /// Ordered outcomes of every check that ran (evaluation short-circuits,
    /// so the last entry of a denial is the failing check).
    pub checks: Vec<CheckOutcome>,
    /// Reason code of the first failing check, on deny.
    pub deny_reason: Option<DenyReason>,
    /// Counters used for the decision.
    pub counters: CountersSnapshot,
    /// Approval ID of the evaluated intent.
    pub approval_id: Uuid,
    /// Evaluation timestamp.
    pub evaluated_at: DateTime<Utc>,
}

impl GuardrailCheckResult {
    /// Returns true if the trade was allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict == GuardrailVerdict::Allow
    }
}
