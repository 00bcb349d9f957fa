//! Safety Engine Binary
//!
//! Wires the guardrail gate and execution engine against the paper broker
//! and drives one sample flow end to end, printing the audit trail.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin safety-engine
//! ```
//!
//! # Environment Variables
//!
//! - `TRADING_MODE`: PAPER | LIVE (default: PAPER; this binary only wires
//!   the paper broker, so LIVE intents are denied with MODE_MISMATCH)
//! - `CONFIG_PATH`: configuration file path (default: config.yaml)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use rust_decimal_macros::dec;
use uuid::Uuid;

use safety_engine::broker::{BrokerAdapter, PaperBroker};
use safety_engine::models::{OrderSide, TradeIntent, TradingMode};
use safety_engine::safety::{DailyCounters, KillSwitchManager};
use safety_engine::{
    AuditLog, EngineError, ExecutionEngine, GuardrailController, load_config, telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = load_config(config_path.as_deref()).context("failed to load configuration")?;

    tracing::info!(mode = %config.mode, "Safety engine starting");

    let audit = Arc::new(AuditLog::new());
    let kill_switches = Arc::new(KillSwitchManager::new(audit.clone()));
    let counters = Arc::new(DailyCounters::new());
    let broker = Arc::new(PaperBroker::instant_fill());

    // Refuse to start against a broker that fails its first probe.
    broker.health_check().await.map_err(EngineError::Broker)?;

    let guardrail = GuardrailController::new(
        config.mode,
        config.guardrails.clone(),
        kill_switches.clone(),
        counters.clone(),
        broker.clone(),
        audit.clone(),
    );
    let engine = ExecutionEngine::new(
        broker,
        kill_switches,
        audit.clone(),
        config.execution.clone(),
    );

    // One sample flow: the shape every upstream caller follows.
    let intent = TradeIntent {
        symbol: "AAPL".to_string(),
        side: OrderSide::Buy,
        mode: TradingMode::Paper,
        quantity: dec!(10),
        reference_price: dec!(230.00),
        stop_loss_offset: dec!(2.50),
        take_profit_offset: dec!(5.00),
        approval_id: Uuid::new_v4(),
        urgent: false,
    };

    let approval = guardrail.evaluate(&intent).await;
    if !approval.is_allowed() {
        tracing::warn!(
            reason = ?approval.deny_reason,
            "Sample intent denied by guardrail"
        );
        return Ok(());
    }

    let result = engine.execute(&approval, &intent).await;
    tracing::info!(
        correlation_id = %result.correlation_id,
        stage = %result.stage,
        fill = ?result.fill,
        "Sample flow finished"
    );

    for entry in audit.entries_for(result.correlation_id) {
        println!(
            "{} {:>12} {:<24} {} -> {} {}",
            entry.recorded_at.format("%H:%M:%S%.3f"),
            entry.actor,
            entry.event,
            entry
                .prior_stage
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            entry
                .new_stage
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            entry.payload,
        );
    }

    Ok(())
}
