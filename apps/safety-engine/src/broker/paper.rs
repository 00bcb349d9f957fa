//! In-process simulated broker for paper mode and tests.
//!
//! Orders fill deterministically after a configurable delay, at the
//! snapshot's reference price adjusted by a fixed slippage. A cancel request
//! only takes effect if it arrives before the simulated fill instant; a
//! cancel racing a fill loses, matching real broker semantics.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::models::{FrozenSnapshot, OrderSide};

use super::{BrokerAdapter, BrokerError, BrokerOrderSnapshot, BrokerOrderStatus, OrderAck};

/// Configuration for the paper broker.
#[derive(Debug, Clone)]
pub struct PaperBrokerConfig {
    /// Delay between acknowledgment and fill.
    pub fill_delay: Duration,
    /// Absolute slippage applied against the trade direction.
    pub slippage: Decimal,
    /// Fraction of the requested quantity that fills (1 = full fill).
    pub fill_fraction: Decimal,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            fill_delay: Duration::from_millis(250),
            slippage: Decimal::ZERO,
            fill_fraction: Decimal::ONE,
        }
    }
}

#[derive(Debug)]
struct SimOrder {
    broker_order_id: String,
    side: OrderSide,
    quantity: Decimal,
    reference_price: Decimal,
    fill_at: Instant,
    cancel_requested_at: Option<Instant>,
}

impl SimOrder {
    /// The order is filled if the fill instant passed before any cancel.
    fn filled_by(&self, now: Instant) -> bool {
        now >= self.fill_at
            && self
                .cancel_requested_at
                .is_none_or(|cancel_at| cancel_at >= self.fill_at)
    }
}

/// Simulated broker adapter.
#[derive(Debug)]
pub struct PaperBroker {
    config: PaperBrokerConfig,
    order_counter: AtomicU64,
    orders: RwLock<Vec<SimOrder>>,
}

impl PaperBroker {
    /// Create a paper broker with the given simulation config.
    #[must_use]
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            config,
            order_counter: AtomicU64::new(0),
            orders: RwLock::new(Vec::new()),
        }
    }

    /// Create a paper broker that fills instantly with no slippage.
    #[must_use]
    pub fn instant_fill() -> Self {
        Self::new(PaperBrokerConfig {
            fill_delay: Duration::ZERO,
            ..Default::default()
        })
    }

    fn fill_price(&self, side: OrderSide, reference_price: Decimal) -> Decimal {
        // Slippage always works against the trade.
        match side {
            OrderSide::Buy => reference_price + self.config.slippage,
            OrderSide::Sell => reference_price - self.config.slippage,
        }
    }

    /// Number of orders placed so far.
    #[must_use]
    pub fn placed_orders(&self) -> usize {
        self.orders.read().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn place_order(&self, snapshot: &FrozenSnapshot) -> Result<OrderAck, BrokerError> {
        let sequence = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let broker_order_id = format!("paper-{sequence}");

        let order = SimOrder {
            broker_order_id: broker_order_id.clone(),
            side: snapshot.side(),
            quantity: snapshot.quantity(),
            reference_price: snapshot.reference_price(),
            fill_at: Instant::now() + self.config.fill_delay,
            cancel_requested_at: None,
        };

        self.orders
            .write()
            .map_err(|_| BrokerError::Transport("order book lock poisoned".to_string()))?
            .push(order);

        tracing::debug!(broker_order_id, symbol = snapshot.symbol(), "Paper order accepted");
        Ok(OrderAck {
            broker_order_id,
            acked_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        let now = Instant::now();
        let mut orders = self
            .orders
            .write()
            .map_err(|_| BrokerError::Transport("order book lock poisoned".to_string()))?;

        let order = orders
            .iter_mut()
            .find(|o| o.broker_order_id == broker_order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(broker_order_id.to_string()))?;

        if order.filled_by(now) {
            return Err(BrokerError::OrderNotCancelable(format!(
                "{broker_order_id} already filled"
            )));
        }
        if order.cancel_requested_at.is_none() {
            order.cancel_requested_at = Some(now);
        }
        Ok(())
    }

    async fn order_status(
        &self,
        broker_order_id: &str,
    ) -> Result<BrokerOrderSnapshot, BrokerError> {
        let now = Instant::now();
        let orders = self
            .orders
            .read()
            .map_err(|_| BrokerError::Transport("order book lock poisoned".to_string()))?;

        let order = orders
            .iter()
            .find(|o| o.broker_order_id == broker_order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(broker_order_id.to_string()))?;

        let snapshot = if order.filled_by(now) {
            let fill_quantity = order.quantity * self.config.fill_fraction;
            let status = if self.config.fill_fraction < Decimal::ONE {
                BrokerOrderStatus::PartiallyFilled
            } else {
                BrokerOrderStatus::Filled
            };
            BrokerOrderSnapshot {
                broker_order_id: order.broker_order_id.clone(),
                status,
                fill_price: Some(self.fill_price(order.side, order.reference_price)),
                fill_quantity,
            }
        } else if order.cancel_requested_at.is_some() {
            BrokerOrderSnapshot {
                broker_order_id: order.broker_order_id.clone(),
                status: BrokerOrderStatus::Canceled,
                fill_price: None,
                fill_quantity: Decimal::ZERO,
            }
        } else {
            BrokerOrderSnapshot {
                broker_order_id: order.broker_order_id.clone(),
                status: BrokerOrderStatus::Accepted,
                fill_price: None,
                fill_quantity: Decimal::ZERO,
            }
        };

        Ok(snapshot)
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn broker_name(&self) -> &'static str {
        "Paper"
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::models::{TradeIntent, TradingMode};

    fn make_snapshot(side: OrderSide) -> FrozenSnapshot {
        FrozenSnapshot::freeze(&TradeIntent {
            symbol: "AAPL".to_string(),
            side,
            mode: TradingMode::Paper,
            quantity: dec!(10),
            reference_price: dec!(200),
            stop_loss_offset: dec!(2),
            take_profit_offset: dec!(4),
            approval_id: Uuid::new_v4(),
            urgent: false,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_fills_after_delay() {
        let broker = PaperBroker::new(PaperBrokerConfig {
            fill_delay: Duration::from_secs(1),
            ..Default::default()
        });

        let ack = broker.place_order(&make_snapshot(OrderSide::Buy)).await.unwrap();

        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::Accepted);

        tokio::time::advance(Duration::from_secs(2)).await;
        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::Filled);
        assert_eq!(status.fill_price, Some(dec!(200)));
        assert_eq!(status.fill_quantity, dec!(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fill_wins() {
        let broker = PaperBroker::new(PaperBrokerConfig {
            fill_delay: Duration::from_secs(10),
            ..Default::default()
        });

        let ack = broker.place_order(&make_snapshot(OrderSide::Buy)).await.unwrap();
        broker.cancel_order(&ack.broker_order_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fill_loses_race() {
        let broker = PaperBroker::instant_fill();

        let ack = broker.place_order(&make_snapshot(OrderSide::Buy)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1)).await;

        let err = broker.cancel_order(&ack.broker_order_id).await.unwrap_err();
        assert!(matches!(err, BrokerError::OrderNotCancelable(_)));

        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::Filled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_slippage_works_against_trade() {
        let broker = PaperBroker::new(PaperBrokerConfig {
            fill_delay: Duration::ZERO,
            slippage: dec!(0.05),
            fill_fraction: Decimal::ONE,
        });

        let ack = broker.place_order(&make_snapshot(OrderSide::Sell)).await.unwrap();
        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.fill_price, Some(dec!(199.95)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_fill_fraction() {
        let broker = PaperBroker::new(PaperBrokerConfig {
            fill_delay: Duration::ZERO,
            slippage: Decimal::ZERO,
            fill_fraction: dec!(0.5),
        });

        let ack = broker.place_order(&make_snapshot(OrderSide::Buy)).await.unwrap();
        let status = broker.order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::PartiallyFilled);
        assert_eq!(status.fill_quantity, dec!(5.0));
    }

    #[tokio::test]
    async fn test_unknown_order_is_an_error() {
        let broker = PaperBroker::instant_fill();
        let err = broker.order_status("missing").await.unwrap_err();
        assert!(matches!(err, BrokerError::OrderNotFound(_)));
    }
}
