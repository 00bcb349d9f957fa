//! Operator kill switches, global and per-symbol.
//!
//! A trip must be visible to any subsequent `is_tripped` call from any
//! concurrent flow, with no caching window: state lives under one `RwLock`
//! and every read takes the lock. Pending flows that need to react without
//! polling subscribe to a `watch` generation counter that bumps on every
//! trip or reset.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::audit::AuditLog;

/// Scope of a kill switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchScope {
    /// Halts all trading.
    Global,
    /// Halts trading for one symbol.
    Symbol(String),
}

impl std::fmt::Display for KillSwitchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Symbol(s) => write!(f, "SYMBOL:{s}"),
        }
    }
}

/// State of one kill switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRecord {
    /// Whether the switch is currently tripped.
    pub tripped: bool,
    /// Operator who last changed the switch.
    pub actor: String,
    /// Reason given for the last change.
    pub reason: String,
    /// Timestamp of the last change.
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SwitchState {
    global: Option<SwitchRecord>,
    symbols: HashMap<String, SwitchRecord>,
}

/// Process-wide kill-switch store.
///
/// Mutated only by explicit operator action; read by the guardrail
/// (pre-submission) and by the engine at its BEFORE/DURING/AFTER
/// checkpoints.
#[derive(Debug)]
pub struct KillSwitchManager {
    state: RwLock<SwitchState>,
    generation: watch::Sender<u64>,
    audit: Arc<AuditLog>,
}

impl KillSwitchManager {
    /// Create a manager with all switches armed (not tripped).
    #[must_use]
    pub fn new(audit: Arc<AuditLog>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: RwLock::new(SwitchState::default()),
            generation,
            audit,
        }
    }

    /// Trip a switch. Idempotent; re-tripping updates actor/reason/timestamp.
    pub fn trip(&self, scope: &KillSwitchScope, reason: &str, actor: &str) {
        let record = SwitchRecord {
            tripped: true,
            actor: actor.to_string(),
            reason: reason.to_string(),
            changed_at: Utc::now(),
        };

        if let Ok(mut state) = self.state.write() {
            match scope {
                KillSwitchScope::Global => state.global = Some(record),
                KillSwitchScope::Symbol(symbol) => {
                    state.symbols.insert(symbol.clone(), record);
                }
            }
        }
        self.notify();

        tracing::warn!(scope = %scope, reason, actor, "Kill switch tripped");
        self.audit.append(
            Uuid::nil(),
            "kill_switch_tripped",
            actor,
            json!({ "scope": scope.to_string(), "reason": reason }),
        );
    }

    /// Reset a switch back to armed.
    pub fn reset(&self, scope: &KillSwitchScope, actor: &str) {
        if let Ok(mut state) = self.state.write() {
            match scope {
                KillSwitchScope::Global => state.global = None,
                KillSwitchScope::Symbol(symbol) => {
                    state.symbols.remove(symbol);
                }
            }
        }
        self.notify();

        tracing::info!(scope = %scope, actor, "Kill switch reset");
        self.audit.append(
            Uuid::nil(),
            "kill_switch_reset",
            actor,
            json!({ "scope": scope.to_string() }),
        );
    }

    /// Whether the given switch is tripped right now.
    #[must_use]
    pub fn is_tripped(&self, scope: &KillSwitchScope) -> bool {
        self.state.read().map_or(false, |state| match scope {
            KillSwitchScope::Global => state.global.as_ref().is_some_and(|r| r.tripped),
            KillSwitchScope::Symbol(symbol) => {
                state.symbols.get(symbol).is_some_and(|r| r.tripped)
            }
        })
    }

    /// Whether trading for `symbol` is halted by the global or the symbol
    /// switch. The scopes are independent flags; this checks both, global
    /// first.
    #[must_use]
    pub fn halts_symbol(&self, symbol: &str) -> bool {
        self.is_tripped(&KillSwitchScope::Global)
            || self.is_tripped(&KillSwitchScope::Symbol(symbol.to_string()))
    }

    /// Last-change record for a switch, if it was ever tripped.
    #[must_use]
    pub fn record(&self, scope: &KillSwitchScope) -> Option<SwitchRecord> {
        self.state.read().ok().and_then(|state| match scope {
            KillSwitchScope::Global => state.global.clone(),
            KillSwitchScope::Symbol(symbol) => state.symbols.get(symbol).cloned(),
        })
    }

    /// Subscribe to change notifications. The value is a generation counter;
    /// receivers re-read switch state after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn notify(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_manager() -> KillSwitchManager {
        KillSwitchManager::new(Arc::new(AuditLog::new()))
    }

    #[tokio::test]
    async fn test_trip_is_immediately_visible() {
        let manager = make_manager();
        assert!(!manager.is_tripped(&KillSwitchScope::Global));

        manager.trip(&KillSwitchScope::Global, "drawdown breach", "ops");
        assert!(manager.is_tripped(&KillSwitchScope::Global));
        assert!(manager.halts_symbol("AAPL"));
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let manager = make_manager();
        manager.trip(&KillSwitchScope::Symbol("TSLA".to_string()), "volatility", "ops");

        assert!(manager.halts_symbol("TSLA"));
        assert!(!manager.halts_symbol("AAPL"));
        assert!(!manager.is_tripped(&KillSwitchScope::Global));
    }

    #[tokio::test]
    async fn test_reset_rearms() {
        let manager = make_manager();
        let scope = KillSwitchScope::Symbol("NVDA".to_string());

        manager.trip(&scope, "halt", "ops");
        manager.reset(&scope, "ops");
        assert!(!manager.is_tripped(&scope));
    }

    #[tokio::test]
    async fn test_record_carries_actor_and_reason() {
        let manager = make_manager();
        manager.trip(&KillSwitchScope::Global, "fat finger", "alice");

        let record = manager.record(&KillSwitchScope::Global).unwrap();
        assert!(record.tripped);
        assert_eq!(record.actor, "alice");
        assert_eq!(record.reason, "fat finger");
    }

    #[tokio::test]
    async fn test_subscription_sees_changes() {
        let manager = make_manager();
        let mut rx = manager.subscribe();
        let before = *rx.borrow_and_update();

        manager.trip(&KillSwitchScope::Global, "halt", "ops");
        rx.changed().await.unwrap();
        assert!(*rx.borrow() > before);
    }

    #[tokio::test]
    async fn test_trip_and_reset_are_audited() {
        let audit = Arc::new(AuditLog::new());
        let manager = KillSwitchManager::new(audit.clone());

        manager.trip(&KillSwitchScope::Global, "halt", "ops");
        manager.reset(&KillSwitchScope::Global, "ops");

        let events: Vec<String> = audit.entries().iter().map(|e| e.event.clone()).collect();
        assert_eq!(events, vec!["kill_switch_tripped", "kill_switch_reset"]);
    }
}
