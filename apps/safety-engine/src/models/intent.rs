//! Trade intents and the frozen snapshot taken at approval time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TradingMode;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A trade the upstream decision component wants executed.
///
/// Produced outside this crate and treated as immutable input: the engine
/// never re-derives prices or offsets after the guardrail approves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Instrument symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Trading mode the intent was produced for.
    pub mode: TradingMode,
    /// Quantity to trade.
    pub quantity: Decimal,
    /// Reference price observed by the upstream component.
    pub reference_price: Decimal,
    /// Stop-loss offset from the eventual fill price (positive).
    pub stop_loss_offset: Decimal,
    /// Take-profit offset from the eventual fill price (positive).
    pub take_profit_offset: Decimal,
    /// Approval identifier assigned upstream.
    pub approval_id: Uuid,
    /// Whether the upstream component flagged this intent as urgent.
    pub urgent: bool,
}

/// Immutable copy of the trade parameters, taken the instant a guardrail
/// approval is granted.
///
/// Every retry and every SL/TP calculation in one execution flow reads from
/// this one copy. Fields are private so nothing outside the constructor can
/// mutate them after the freeze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenSnapshot {
    symbol: String,
    side: OrderSide,
    mode: TradingMode,
    quantity: Decimal,
    reference_price: Decimal,
    stop_loss_offset: Decimal,
    take_profit_offset: Decimal,
    approval_id: Uuid,
    urgent: bool,
    frozen_at: DateTime<Utc>,
}

impl FrozenSnapshot {
    /// Freeze the execution-relevant fields of an intent.
    #[must_use]
    pub fn freeze(intent: &TradeIntent) -> Self {
        Self {
            symbol: intent.symbol.clone(),
            side: intent.side,
            mode: intent.mode,
            quantity: intent.quantity,
            reference_price: intent.reference_price,
            stop_loss_offset: intent.stop_loss_offset,
            take_profit_offset: intent.take_profit_offset,
            approval_id: intent.approval_id,
            urgent: intent.urgent,
            frozen_at: Utc::now(),
        }
    }

    /// Instrument symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Trading mode the intent was produced for.
    #[must_use]
    pub const fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Quantity to trade.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Reference price at decision time. Never used for SL/TP computation.
    #[must_use]
    pub const fn reference_price(&self) -> Decimal {
        self.reference_price
    }

    /// Stop-loss offset.
    #[must_use]
    pub const fn stop_loss_offset(&self) -> Decimal {
        self.stop_loss_offset
    }

    /// Take-profit offset.
    #[must_use]
    pub const fn take_profit_offset(&self) -> Decimal {
        self.take_profit_offset
    }

    /// Approval identifier granted by the guardrail evaluation.
    #[must_use]
    pub const fn approval_id(&self) -> Uuid {
        self.approval_id
    }

    /// Urgency flag from the upstream component.
    #[must_use]
    pub const fn urgent(&self) -> bool {
        self.urgent
    }

    /// Timestamp of the freeze.
    #[must_use]
    pub const fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    /// Actual stop-loss level for a confirmed fill.
    ///
    /// Computed from the actual fill price, never from
    /// [`reference_price`](Self::reference_price). For a buy the stop sits
    /// below the fill; for a sell, above it.
    #[must_use]
    pub fn stop_loss_for_fill(&self, fill_price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => fill_price - self.stop_loss_offset,
            OrderSide::Sell => fill_price + self.stop_loss_offset,
        }
    }

    /// Actual take-profit level for a confirmed fill.
    ///
    /// Same actual-fill-price rule as [`stop_loss_for_fill`](Self::stop_loss_for_fill).
    #[must_use]
    pub fn take_profit_for_fill(&self, fill_price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => fill_price + self.take_profit_offset,
            OrderSide::Sell => fill_price - self.take_profit_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn make_intent(side: OrderSide) -> TradeIntent {
        TradeIntent {
            symbol: "AAPL".to_string(),
            side,
            mode: TradingMode::Paper,
            quantity: dec!(10),
            reference_price: dec!(230.00),
            stop_loss_offset: dec!(2.50),
            take_profit_offset: dec!(5.00),
            approval_id: Uuid::new_v4(),
            urgent: false,
        }
    }

    #[test]
    fn test_freeze_copies_intent_fields() {
        let intent = make_intent(OrderSide::Buy);
        let snapshot = FrozenSnapshot::freeze(&intent);

        assert_eq!(snapshot.symbol(), "AAPL");
        assert_eq!(snapshot.side(), OrderSide::Buy);
        assert_eq!(snapshot.reference_price(), dec!(230.00));
        assert_eq!(snapshot.approval_id(), intent.approval_id);
    }

    #[test]
    fn test_buy_stops_bracket_the_fill_price() {
        let snapshot = FrozenSnapshot::freeze(&make_intent(OrderSide::Buy));

        // SL/TP come from the fill price, which here differs from reference.
        let fill = dec!(231.20);
        assert_eq!(snapshot.stop_loss_for_fill(fill), dec!(228.70));
        assert_eq!(snapshot.take_profit_for_fill(fill), dec!(236.20));
    }

    #[test]
    fn test_sell_stops_invert_direction() {
        let snapshot = FrozenSnapshot::freeze(&make_intent(OrderSide::Sell));

        let fill = dec!(229.00);
        assert_eq!(snapshot.stop_loss_for_fill(fill), dec!(231.50));
        assert_eq!(snapshot.take_profit_for_fill(fill), dec!(224.00));
    }

    #[test]
    fn test_stops_ignore_reference_price() {
        let snapshot = FrozenSnapshot::freeze(&make_intent(OrderSide::Buy));

        // Fill far from reference: levels must track the fill, not reference.
        let fill = dec!(250.00);
        assert_eq!(snapshot.stop_loss_for_fill(fill), dec!(247.50));
        assert_ne!(
            snapshot.stop_loss_for_fill(fill),
            snapshot.reference_price() - snapshot.stop_loss_offset()
        );
    }
}
