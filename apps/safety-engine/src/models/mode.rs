//! Trading mode configuration.

use serde::{Deserialize, Serialize};

/// Trading mode (PAPER or LIVE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    /// Paper trading mode - simulated orders with live data.
    Paper,
    /// Live trading mode - real orders with real money.
    Live,
}

impl TradingMode {
    /// Returns true if this is a live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Returns true if this is a paper trading mode.
    #[must_use]
    pub const fn is_paper(&self) -> bool {
        matches!(self, Self::Paper)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

impl std::str::FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PAPER" => Ok(Self::Paper),
            "LIVE" => Ok(Self::Live),
            _ => Err(format!("Invalid trading mode: {s}. Must be PAPER or LIVE.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_predicates() {
        assert!(TradingMode::Live.is_live());
        assert!(!TradingMode::Paper.is_live());
        assert!(TradingMode::Paper.is_paper());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("paper".parse::<TradingMode>(), Ok(TradingMode::Paper));
        assert_eq!("LIVE".parse::<TradingMode>(), Ok(TradingMode::Live));
        assert!("backtest".parse::<TradingMode>().is_err());
    }
}
