//! One-shot reconciliation of a flow against the broker's record.
//!
//! Exactly one authoritative status query per flow, made after the flow
//! reaches a terminal fill/cancel/timeout stage. Any mismatch forces manual
//! review; no automatic correction is ever attempted.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::AuditLog;
use crate::broker::{BrokerAdapter, BrokerOrderStatus};
use crate::models::{ExecutionResult, ExecutionStage, ReconciliationStatus};

/// Local vs broker value pair for one compared field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparedField {
    /// Field name.
    pub field: String,
    /// Locally recorded value.
    pub local: String,
    /// Broker-reported value.
    pub broker: String,
    /// Whether the values agree (within tolerance, for prices).
    pub matched: bool,
}

/// Outcome of the single reconciliation query for one flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Match or mismatch.
    pub status: ReconciliationStatus,
    /// Every compared field with both sides' values.
    pub compared: Vec<ComparedField>,
    /// Human-readable discrepancy descriptions, on mismatch.
    pub discrepancies: Vec<String>,
}

impl ReconciliationReport {
    fn matched(compared: Vec<ComparedField>) -> Self {
        Self {
            status: ReconciliationStatus::Match,
            compared,
            discrepancies: Vec::new(),
        }
    }

    fn mismatched(compared: Vec<ComparedField>, discrepancies: Vec<String>) -> Self {
        Self {
            status: ReconciliationStatus::Mismatch,
            compared,
            discrepancies,
        }
    }
}

/// Consistency check between the local flow record and the broker.
pub struct ReconciliationService<B: BrokerAdapter> {
    broker: Arc<B>,
    price_epsilon: Decimal,
    audit: Arc<AuditLog>,
}

impl<B: BrokerAdapter> ReconciliationService<B> {
    /// Create a service comparing prices within `price_epsilon`.
    #[must_use]
    pub fn new(broker: Arc<B>, price_epsilon: Decimal, audit: Arc<AuditLog>) -> Self {
        Self {
            broker,
            price_epsilon,
            audit,
        }
    }

    /// Reconcile a flow, at most once.
    ///
    /// If the flow already carries a report this is a no-op: the idempotency
    /// flag is set permanently by the first completed attempt and never
    /// cleared, so re-entered error-handling paths cannot trigger a second
    /// broker query. A query failure degrades to mismatch (broker state
    /// unknown, fail closed).
    pub async fn reconcile(&self, result: &mut ExecutionResult) {
        if result.reconciliation.is_some() {
            tracing::debug!(
                correlation_id = %result.correlation_id,
                "Reconciliation already performed, skipping"
            );
            return;
        }

        let Some(broker_order_id) = result.broker_order_id().map(String::from) else {
            // Nothing was ever acknowledged; there is no broker record to
            // compare against.
            return;
        };

        let report = match self.broker.order_status(&broker_order_id).await {
            Ok(broker_view) => self.compare(result, &broker_view.status, broker_view.fill_price, broker_view.fill_quantity),
            Err(e) => {
                tracing::error!(
                    correlation_id = %result.correlation_id,
                    broker_order_id,
                    error = %e,
                    "Reconciliation query failed"
                );
                ReconciliationReport::mismatched(
                    Vec::new(),
                    vec![format!("authoritative status query failed: {e}")],
                )
            }
        };

        self.audit.append_transition(
            result.correlation_id,
            "reconciliation_completed",
            Some(result.stage),
            None,
            "reconciliation",
            json!({
                "broker_order_id": broker_order_id,
                "status": report.status,
                "discrepancies": report.discrepancies,
            }),
        );

        result.reconciliation = Some(report);
    }

    fn compare(
        &self,
        result: &ExecutionResult,
        broker_status: &BrokerOrderStatus,
        broker_price: Option<Decimal>,
        broker_quantity: Decimal,
    ) -> ReconciliationReport {
        let mut compared = Vec::new();
        let mut discrepancies = Vec::new();

        // Status: the local stage and broker status must tell the same story.
        let status_matches = match result.stage {
            ExecutionStage::Filled => *broker_status == BrokerOrderStatus::Filled,
            ExecutionStage::PartiallyFilled => {
                matches!(
                    broker_status,
                    BrokerOrderStatus::PartiallyFilled | BrokerOrderStatus::Filled
                )
            }
            ExecutionStage::Cancelled => *broker_status == BrokerOrderStatus::Canceled,
            // A timed-out flow has no local fill; the broker must agree that
            // nothing filled.
            ExecutionStage::TimedOut => !matches!(
                broker_status,
                BrokerOrderStatus::Filled | BrokerOrderStatus::PartiallyFilled
            ),
            _ => false,
        };
        compared.push(ComparedField {
            field: "status".to_string(),
            local: result.stage.to_string(),
            broker: broker_status.to_string(),
            matched: status_matches,
        });
        if !status_matches {
            discrepancies.push(format!(
                "status disagrees: local {} vs broker {broker_status}",
                result.stage
            ));
        }

        if let Some(fill) = &result.fill {
            // Price, within epsilon.
            let price_matches = broker_price
                .is_some_and(|p| (p - fill.fill_price).abs() <= self.price_epsilon);
            compared.push(ComparedField {
                field: "fill_price".to_string(),
                local: fill.fill_price.to_string(),
                broker: broker_price.map_or_else(|| "none".to_string(), |p| p.to_string()),
                matched: price_matches,
            });
            if !price_matches {
                discrepancies.push(format!(
                    "fill price disagrees beyond epsilon {}: local {} vs broker {:?}",
                    self.price_epsilon, fill.fill_price, broker_price
                ));
            }

            // Quantity, exact.
            let quantity_matches = broker_quantity == fill.fill_quantity;
            compared.push(ComparedField {
                field: "fill_quantity".to_string(),
                local: fill.fill_quantity.to_string(),
                broker: broker_quantity.to_string(),
                matched: quantity_matches,
            });
            if !quantity_matches {
                discrepancies.push(format!(
                    "fill quantity disagrees: local {} vs broker {broker_quantity}",
                    fill.fill_quantity
                ));
            }
        }

        if discrepancies.is_empty() {
            ReconciliationReport::matched(compared)
        } else {
            ReconciliationReport::mismatched(compared, discrepancies)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::broker::{BrokerError, BrokerOrderSnapshot, OrderAck};
    use crate::models::{
        AttemptStatus, ExecutionAttempt, FillDetails, FrozenSnapshot, OrderSide, TradeIntent,
        TradingMode,
    };

    /// Broker stub returning a canned status and counting queries.
    struct CannedBroker {
        status: BrokerOrderStatus,
        fill_price: Option<Decimal>,
        fill_quantity: Decimal,
        fail: bool,
        queries: AtomicU32,
    }

    impl CannedBroker {
        fn filled(price: Decimal, quantity: Decimal) -> Self {
            Self {
                status: BrokerOrderStatus::Filled,
                fill_price: Some(price),
                fill_quantity: quantity,
                fail: false,
                queries: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                status: BrokerOrderStatus::Accepted,
                fill_price: None,
                fill_quantity: Decimal::ZERO,
                fail: true,
                queries: AtomicU32::new(0),
            }
        }

        fn query_count(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrokerAdapter for CannedBroker {
        async fn place_order(
            &self,
            _snapshot: &FrozenSnapshot,
        ) -> Result<OrderAck, BrokerError> {
            Ok(OrderAck {
                broker_order_id: "canned-1".to_string(),
                acked_at: Utc::now(),
            })
        }

        async fn cancel_order(&self, _broker_order_id: &str) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn order_status(
            &self,
            broker_order_id: &str,
        ) -> Result<BrokerOrderSnapshot, BrokerError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BrokerError::Unavailable("down".to_string()));
            }
            Ok(BrokerOrderSnapshot {
                broker_order_id: broker_order_id.to_string(),
                status: self.status,
                fill_price: self.fill_price,
                fill_quantity: self.fill_quantity,
            })
        }

        async fn health_check(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn broker_name(&self) -> &'static str {
            "Canned"
        }
    }

    fn make_filled_result(fill_price: Decimal, fill_quantity: Decimal) -> ExecutionResult {
        let snapshot = FrozenSnapshot::freeze(&TradeIntent {
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            mode: TradingMode::Paper,
            quantity: fill_quantity,
            reference_price: dec!(100),
            stop_loss_offset: dec!(1),
            take_profit_offset: dec!(2),
            approval_id: Uuid::new_v4(),
            urgent: false,
        });
        let mut result = ExecutionResult::new(snapshot);
        result.stage = ExecutionStage::Filled;
        result.attempts.push(ExecutionAttempt {
            sequence: 1,
            submitted_at: Utc::now(),
            broker_order_id: Some("canned-1".to_string()),
            status: AttemptStatus::Acknowledged,
            error: None,
        });
        result.fill = Some(FillDetails {
            fill_price,
            fill_quantity,
            stop_loss: fill_price - dec!(1),
            take_profit: fill_price + dec!(2),
            observed_at: Utc::now(),
            late: false,
        });
        result
    }

    fn make_service(broker: Arc<CannedBroker>) -> ReconciliationService<CannedBroker> {
        ReconciliationService::new(broker, dec!(0.01), Arc::new(AuditLog::new()))
    }

    #[tokio::test]
    async fn test_clean_match() {
        let broker = Arc::new(CannedBroker::filled(dec!(100.50), dec!(10)));
        let service = make_service(broker.clone());
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;

        let report = result.reconciliation.unwrap();
        assert_eq!(report.status, ReconciliationStatus::Match);
        assert!(report.discrepancies.is_empty());
        assert_eq!(broker.query_count(), 1);
    }

    #[tokio::test]
    async fn test_price_within_epsilon_matches() {
        let broker = Arc::new(CannedBroker::filled(dec!(100.505), dec!(10)));
        let service = make_service(broker);
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;

        assert_eq!(
            result.reconciliation.unwrap().status,
            ReconciliationStatus::Match
        );
    }

    #[tokio::test]
    async fn test_price_beyond_epsilon_mismatches() {
        let broker = Arc::new(CannedBroker::filled(dec!(100.75), dec!(10)));
        let service = make_service(broker);
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;

        let report = result.reconciliation.unwrap();
        assert_eq!(report.status, ReconciliationStatus::Mismatch);
        assert!(!report.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn test_quantity_mismatch() {
        let broker = Arc::new(CannedBroker::filled(dec!(100.50), dec!(7)));
        let service = make_service(broker);
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;

        assert_eq!(
            result.reconciliation.unwrap().status,
            ReconciliationStatus::Mismatch
        );
    }

    #[tokio::test]
    async fn test_second_reconcile_is_a_no_op() {
        let broker = Arc::new(CannedBroker::filled(dec!(100.50), dec!(10)));
        let service = make_service(broker.clone());
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;
        // Error-handling path re-enters reconciliation.
        service.reconcile(&mut result).await;
        service.reconcile(&mut result).await;

        assert_eq!(broker.query_count(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_degrades_to_mismatch() {
        let broker = Arc::new(CannedBroker::failing());
        let service = make_service(broker);
        let mut result = make_filled_result(dec!(100.50), dec!(10));

        service.reconcile(&mut result).await;

        let report = result.reconciliation.unwrap();
        assert_eq!(report.status, ReconciliationStatus::Mismatch);
        assert!(report.discrepancies[0].contains("query failed"));
    }

    #[tokio::test]
    async fn test_no_broker_order_skips_query() {
        let broker = Arc::new(CannedBroker::filled(dec!(100), dec!(10)));
        let service = make_service(broker.clone());

        let mut result = make_filled_result(dec!(100), dec!(10));
        result.attempts.clear();
        result.stage = ExecutionStage::Aborted;
        result.fill = None;

        service.reconcile(&mut result).await;

        assert!(result.reconciliation.is_none());
        assert_eq!(broker.query_count(), 0);
    }
}
