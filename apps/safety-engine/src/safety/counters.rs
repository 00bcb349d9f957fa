//! Daily trade counters with UTC-day rollover.
//!
//! The limit check and the provisional reservation happen inside one
//! critical section so two concurrent guardrail evaluations can never both
//! observe a stale under-limit count and both pass.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::config::GuardrailLimits;
use crate::models::{CountersSnapshot, DenyReason};

#[derive(Debug)]
struct CountersInner {
    day: NaiveDate,
    total_trades: u32,
    symbol_trades: HashMap<String, u32>,
    realized_pnl: Decimal,
}

impl CountersInner {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            total_trades: 0,
            symbol_trades: HashMap::new(),
            realized_pnl: Decimal::ZERO,
        }
    }

    fn rollover_if_stale(&mut self, today: NaiveDate) {
        if self.day != today {
            tracing::info!(
                prior_day = %self.day,
                day = %today,
                trades = self.total_trades,
                pnl = %self.realized_pnl,
                "Resetting daily counters at UTC day boundary"
            );
            *self = Self::new(today);
        }
    }

    fn snapshot(&self, symbol: &str) -> CountersSnapshot {
        CountersSnapshot {
            day: self.day,
            total_trades: self.total_trades,
            symbol_trades: self.symbol_trades.get(symbol).copied().unwrap_or(0),
            realized_pnl: self.realized_pnl,
        }
    }
}

/// Process-wide per-UTC-day trade counters.
#[derive(Debug)]
pub struct DailyCounters {
    inner: Mutex<CountersInner>,
}

impl Default for DailyCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyCounters {
    /// Create counters anchored at the current UTC day.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CountersInner::new(Utc::now().date_naive())),
        }
    }

    /// Check the counter limits for `symbol` and, if all pass, reserve one
    /// trade for the day and the symbol - atomically.
    ///
    /// Returns the counter snapshot as of the decision (pre-reservation) and
    /// the first violated limit, if any. Checks run in guardrail order:
    /// daily total, symbol total, daily loss.
    pub fn check_and_reserve(
        &self,
        symbol: &str,
        limits: &GuardrailLimits,
    ) -> (CountersSnapshot, Option<DenyReason>) {
        let Ok(mut inner) = self.inner.lock() else {
            // Poisoned lock: fail closed without reserving.
            return (
                CountersSnapshot {
                    day: Utc::now().date_naive(),
                    total_trades: u32::MAX,
                    symbol_trades: u32::MAX,
                    realized_pnl: Decimal::ZERO,
                },
                Some(DenyReason::DailyMaxTrades),
            );
        };
        inner.rollover_if_stale(Utc::now().date_naive());

        let snapshot = inner.snapshot(symbol);

        if snapshot.total_trades >= limits.max_daily_trades {
            return (snapshot, Some(DenyReason::DailyMaxTrades));
        }
        if snapshot.symbol_trades >= limits.max_symbol_trades {
            return (snapshot, Some(DenyReason::SymbolMaxTrades));
        }
        if snapshot.realized_pnl <= -limits.max_daily_loss {
            return (snapshot, Some(DenyReason::DailyMaxLoss));
        }

        inner.total_trades += 1;
        *inner.symbol_trades.entry(symbol.to_string()).or_insert(0) += 1;

        (snapshot, None)
    }

    /// Record a realized P&L delta (negative for a loss).
    pub fn record_pnl(&self, delta: Decimal) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rollover_if_stale(Utc::now().date_naive());
            inner.realized_pnl += delta;
        }
    }

    /// Current counters for a symbol, without reserving anything.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> CountersSnapshot {
        self.inner.lock().map_or(
            CountersSnapshot {
                day: Utc::now().date_naive(),
                total_trades: 0,
                symbol_trades: 0,
                realized_pnl: Decimal::ZERO,
            },
            |mut inner| {
                inner.rollover_if_stale(Utc::now().date_naive());
                inner.snapshot(symbol)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;

    fn limits() -> GuardrailLimits {
        GuardrailLimits {
            max_daily_trades: 3,
            max_symbol_trades: 2,
            max_daily_loss: dec!(500),
        }
    }

    #[test]
    fn test_reserve_increments_counts() {
        let counters = DailyCounters::new();

        let (snap, deny) = counters.check_and_reserve("AAPL", &limits());
        assert!(deny.is_none());
        assert_eq!(snap.total_trades, 0);

        let snap = counters.snapshot("AAPL");
        assert_eq!(snap.total_trades, 1);
        assert_eq!(snap.symbol_trades, 1);
    }

    #[test]
    fn test_daily_limit_boundary() {
        let counters = DailyCounters::new();
        let limits = limits();

        // max_daily_trades = 3: exactly three reservations pass, the fourth
        // is denied.
        for _ in 0..2 {
            assert!(counters.check_and_reserve("A", &limits).1.is_none());
        }
        assert!(counters.check_and_reserve("B", &limits).1.is_none());
        let (_, deny) = counters.check_and_reserve("C", &limits);
        assert_eq!(deny, Some(DenyReason::DailyMaxTrades));
    }

    #[test]
    fn test_symbol_limit_checked_after_daily() {
        let counters = DailyCounters::new();
        let limits = limits();

        assert!(counters.check_and_reserve("TSLA", &limits).1.is_none());
        assert!(counters.check_and_reserve("TSLA", &limits).1.is_none());
        let (_, deny) = counters.check_and_reserve("TSLA", &limits);
        assert_eq!(deny, Some(DenyReason::SymbolMaxTrades));

        // A different symbol still fits under the daily total.
        assert!(counters.check_and_reserve("MSFT", &limits).1.is_none());
    }

    #[test]
    fn test_loss_limit_denies() {
        let counters = DailyCounters::new();
        counters.record_pnl(dec!(-500));

        let (snap, deny) = counters.check_and_reserve("AAPL", &limits());
        assert_eq!(deny, Some(DenyReason::DailyMaxLoss));
        assert_eq!(snap.realized_pnl, dec!(-500));
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_limit() {
        let counters = Arc::new(DailyCounters::new());
        let limits = Arc::new(GuardrailLimits {
            max_daily_trades: 5,
            max_symbol_trades: 5,
            max_daily_loss: dec!(1000),
        });

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counters = counters.clone();
                let limits = limits.clone();
                std::thread::spawn(move || {
                    counters.check_and_reserve("AAPL", &limits).1.is_none()
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(allowed, 5);
    }
}
