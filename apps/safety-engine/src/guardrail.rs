//! Pre-flight guardrail gate.
//!
//! Runs the ordered, short-circuiting safety checks that every trade intent
//! must pass before the execution engine may touch it. Denial is a
//! first-class result, never an error: the hot path does not raise.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::audit::AuditLog;
use crate::broker::BrokerAdapter;
use crate::config::GuardrailLimits;
use crate::models::{
    CheckName, CheckOutcome, DenyReason, GuardrailCheckResult, GuardrailVerdict, TradeIntent,
    TradingMode,
};
use crate::safety::{DailyCounters, KillSwitchManager, KillSwitchScope};

/// Pre-flight authorization gate.
///
/// Check order (first failure wins):
/// 1. global kill switch
/// 2. symbol kill switch
/// 3. mode match
/// 4. broker health (fail-closed)
/// 5. daily trade limit
/// 6. symbol trade limit
/// 7. daily loss limit
///
/// Checks 5-7 and the provisional counter reservation run in one atomic
/// section inside [`DailyCounters::check_and_reserve`].
pub struct GuardrailController<B: BrokerAdapter> {
    system_mode: TradingMode,
    limits: GuardrailLimits,
    kill_switches: Arc<KillSwitchManager>,
    counters: Arc<DailyCounters>,
    broker: Arc<B>,
    audit: Arc<AuditLog>,
}

impl<B: BrokerAdapter> GuardrailController<B> {
    /// Create a new guardrail controller.
    #[must_use]
    pub fn new(
        system_mode: TradingMode,
        limits: GuardrailLimits,
        kill_switches: Arc<KillSwitchManager>,
        counters: Arc<DailyCounters>,
        broker: Arc<B>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            system_mode,
            limits,
            kill_switches,
            counters,
            broker,
            audit,
        }
    }

    /// Evaluate an intent. On allow, one trade is provisionally reserved
    /// against the daily and per-symbol counters.
    pub async fn evaluate(&self, intent: &TradeIntent) -> GuardrailCheckResult {
        let mut checks = Vec::with_capacity(7);
        let mut deny_reason = None;

        // Checks 1-2: kill switches, global first.
        let global_tripped = self.kill_switches.is_tripped(&KillSwitchScope::Global);
        checks.push(CheckOutcome {
            check: CheckName::GlobalKillSwitch,
            passed: !global_tripped,
        });
        if global_tripped {
            deny_reason = Some(DenyReason::GlobalKillSwitch);
        }

        if deny_reason.is_none() {
            let symbol_tripped = self
                .kill_switches
                .is_tripped(&KillSwitchScope::Symbol(intent.symbol.clone()));
            checks.push(CheckOutcome {
                check: CheckName::SymbolKillSwitch,
                passed: !symbol_tripped,
            });
            if symbol_tripped {
                deny_reason = Some(DenyReason::SymbolKillSwitch);
            }
        }

        // Check 3: intent mode must match the configured system mode.
        if deny_reason.is_none() {
            let matches = intent.mode == self.system_mode;
            checks.push(CheckOutcome {
                check: CheckName::ModeMatch,
                passed: matches,
            });
            if !matches {
                deny_reason = Some(DenyReason::ModeMismatch);
            }
        }

        // Check 4: broker health probe. Any probe error is unhealthy.
        if deny_reason.is_none() {
            let healthy = self.broker.health_check().await.is_ok();
            checks.push(CheckOutcome {
                check: CheckName::BrokerHealth,
                passed: healthy,
            });
            if !healthy {
                deny_reason = Some(DenyReason::BrokerUnhealthy);
            }
        }

        // Checks 5-7 + reservation, in one critical section.
        let counters = if deny_reason.is_none() {
            let (snapshot, counter_deny) =
                self.counters.check_and_reserve(&intent.symbol, &self.limits);
            checks.push(CheckOutcome {
                check: CheckName::DailyTradeLimit,
                passed: counter_deny != Some(DenyReason::DailyMaxTrades),
            });
            if counter_deny != Some(DenyReason::DailyMaxTrades) {
                checks.push(CheckOutcome {
                    check: CheckName::SymbolTradeLimit,
                    passed: counter_deny != Some(DenyReason::SymbolMaxTrades),
                });
                if counter_deny != Some(DenyReason::SymbolMaxTrades) {
                    checks.push(CheckOutcome {
                        check: CheckName::DailyLossLimit,
                        passed: counter_deny != Some(DenyReason::DailyMaxLoss),
                    });
                }
            }
            deny_reason = counter_deny;
            snapshot
        } else {
            self.counters.snapshot(&intent.symbol)
        };

        let verdict = if deny_reason.is_none() {
            GuardrailVerdict::Allow
        } else {
            GuardrailVerdict::Deny
        };

        let result = GuardrailCheckResult {
            verdict,
            checks,
            deny_reason,
            counters,
            approval_id: intent.approval_id,
            evaluated_at: Utc::now(),
        };

        match deny_reason {
            None => tracing::info!(
                symbol = %intent.symbol,
                side = %intent.side,
                approval_id = %intent.approval_id,
                "Guardrail allowed trade"
            ),
            Some(reason) => tracing::warn!(
                symbol = %intent.symbol,
                reason = reason.as_str(),
                "Guardrail denied trade"
            ),
        }

        self.audit.append(
            intent.approval_id,
            "guardrail_evaluated",
            "guardrail",
            json!({
                "symbol": intent.symbol,
                "verdict": result.verdict,
                "deny_reason": result.deny_reason.map(|r| r.as_str()),
                "checks": result.checks,
                "counters": result.counters,
            }),
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::broker::testing::StubBroker;
    use crate::models::OrderSide;

    fn make_intent(symbol: &str) -> TradeIntent {
        TradeIntent {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            mode: TradingMode::Paper,
            quantity: dec!(1),
            reference_price: dec!(100),
            stop_loss_offset: dec!(1),
            take_profit_offset: dec!(2),
            approval_id: Uuid::new_v4(),
            urgent: false,
        }
    }

    fn make_controller(
        broker: Arc<StubBroker>,
        limits: GuardrailLimits,
    ) -> (GuardrailController<StubBroker>, Arc<KillSwitchManager>, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let switches = Arc::new(KillSwitchManager::new(audit.clone()));
        let controller = GuardrailController::new(
            TradingMode::Paper,
            limits,
            switches.clone(),
            Arc::new(DailyCounters::new()),
            broker,
            audit.clone(),
        );
        (controller, switches, audit)
    }

    fn default_limits() -> GuardrailLimits {
        GuardrailLimits {
            max_daily_trades: 10,
            max_symbol_trades: 5,
            max_daily_loss: dec!(1000),
        }
    }

    #[tokio::test]
    async fn test_allow_runs_all_seven_checks() {
        let (controller, _, audit) =
            make_controller(Arc::new(StubBroker::healthy()), default_limits());

        let result = controller.evaluate(&make_intent("AAPL")).await;

        assert!(result.is_allowed());
        assert_eq!(result.checks.len(), 7);
        assert!(result.checks.iter().all(|c| c.passed));
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_global_kill_switch_short_circuits() {
        let (controller, switches, _) =
            make_controller(Arc::new(StubBroker::healthy()), default_limits());
        switches.trip(&KillSwitchScope::Global, "halt", "ops");

        let result = controller.evaluate(&make_intent("AAPL")).await;

        assert_eq!(result.deny_reason, Some(DenyReason::GlobalKillSwitch));
        assert_eq!(result.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_symbol_kill_switch_denies_only_that_symbol() {
        let (controller, switches, _) =
            make_controller(Arc::new(StubBroker::healthy()), default_limits());
        switches.trip(&KillSwitchScope::Symbol("TSLA".to_string()), "halt", "ops");

        let denied = controller.evaluate(&make_intent("TSLA")).await;
        assert_eq!(denied.deny_reason, Some(DenyReason::SymbolKillSwitch));

        let allowed = controller.evaluate(&make_intent("AAPL")).await;
        assert!(allowed.is_allowed());
    }

    #[tokio::test]
    async fn test_mode_mismatch_denied() {
        let (controller, _, _) =
            make_controller(Arc::new(StubBroker::healthy()), default_limits());

        let mut intent = make_intent("AAPL");
        intent.mode = TradingMode::Live;
        let result = controller.evaluate(&intent).await;

        assert_eq!(result.deny_reason, Some(DenyReason::ModeMismatch));
    }

    #[tokio::test]
    async fn test_unhealthy_broker_fails_closed() {
        let (controller, _, _) =
            make_controller(Arc::new(StubBroker::unhealthy()), default_limits());

        let result = controller.evaluate(&make_intent("AAPL")).await;

        assert_eq!(result.deny_reason, Some(DenyReason::BrokerUnhealthy));
    }

    #[tokio::test]
    async fn test_daily_limit_boundary_allows_then_denies() {
        let limits = GuardrailLimits {
            max_daily_trades: 2,
            max_symbol_trades: 10,
            max_daily_loss: dec!(1000),
        };
        let (controller, _, _) = make_controller(Arc::new(StubBroker::healthy()), limits);

        // total == max - 1: allowed.
        assert!(controller.evaluate(&make_intent("A")).await.is_allowed());
        assert!(controller.evaluate(&make_intent("B")).await.is_allowed());

        // total == max: denied.
        let result = controller.evaluate(&make_intent("C")).await;
        assert_eq!(result.deny_reason, Some(DenyReason::DailyMaxTrades));
    }

    #[tokio::test]
    async fn test_denied_trade_reserves_nothing() {
        let (controller, switches, _) =
            make_controller(Arc::new(StubBroker::healthy()), default_limits());
        switches.trip(&KillSwitchScope::Global, "halt", "ops");

        let result = controller.evaluate(&make_intent("AAPL")).await;
        assert!(!result.is_allowed());
        assert_eq!(result.counters.total_trades, 0);

        switches.reset(&KillSwitchScope::Global, "ops");
        let result = controller.evaluate(&make_intent("AAPL")).await;
        // Still sees a zero pre-reservation count: the denied evaluation
        // consumed no budget.
        assert_eq!(result.counters.total_trades, 0);
        assert!(result.is_allowed());
    }
}
