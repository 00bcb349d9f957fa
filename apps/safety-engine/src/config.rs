//! Configuration for the safety engine.
//!
//! Provides configuration loading and validation for the guardrail limits
//! and the execution engine, from a YAML file with env-var overrides for the
//! trading mode.
//!
//! # Usage
//!
//! ```rust,ignore
//! use safety_engine::config::{Config, load_config};
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Access configuration values
//! println!("mode: {}", config.mode);
//! ```

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::RetryPolicy;
use crate::models::TradingMode;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// System trading mode. Intents in any other mode are denied.
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
    /// Guardrail limits.
    #[serde(default)]
    pub guardrails: GuardrailLimits,
    /// Execution engine configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            guardrails: GuardrailLimits::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the first nonsensical value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guardrails.max_daily_trades == 0 {
            return Err(ConfigError::ValidationError(
                "guardrails.max_daily_trades must be at least 1".to_string(),
            ));
        }
        if self.guardrails.max_symbol_trades == 0 {
            return Err(ConfigError::ValidationError(
                "guardrails.max_symbol_trades must be at least 1".to_string(),
            ));
        }
        if self.guardrails.max_daily_loss <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "guardrails.max_daily_loss must be positive".to_string(),
            ));
        }
        if self.execution.execution_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution.execution_window_secs must be at least 1".to_string(),
            ));
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "execution.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.execution.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "execution.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.reconciliation_price_epsilon < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "execution.reconciliation_price_epsilon must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Guardrail counter limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailLimits {
    /// Maximum trades per UTC day, across all symbols.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    /// Maximum trades per UTC day for one symbol.
    #[serde(default = "default_max_symbol_trades")]
    pub max_symbol_trades: u32,
    /// Maximum cumulative realized loss per UTC day (positive figure).
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
}

impl Default for GuardrailLimits {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            max_symbol_trades: default_max_symbol_trades(),
            max_daily_loss: default_max_daily_loss(),
        }
    }
}

/// Execution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard wall-clock window for driving one flow, in seconds.
    #[serde(default = "default_execution_window_secs")]
    pub execution_window_secs: u64,
    /// Broker status poll interval while pending, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to keep listening for a late fill past the deadline,
    /// in seconds.
    #[serde(default = "default_late_fill_grace_secs")]
    pub late_fill_grace_secs: u64,
    /// Price tolerance for reconciliation comparison.
    #[serde(default = "default_reconciliation_price_epsilon")]
    pub reconciliation_price_epsilon: Decimal,
    /// Retry policy for transient submission rejections.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execution_window_secs: default_execution_window_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            late_fill_grace_secs: default_late_fill_grace_secs(),
            reconciliation_price_epsilon: default_reconciliation_price_epsilon(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutionConfig {
    /// The execution window as a duration.
    #[must_use]
    pub const fn execution_window(&self) -> Duration {
        Duration::from_secs(self.execution_window_secs)
    }

    /// The status poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The late-fill grace window as a duration.
    #[must_use]
    pub const fn late_fill_grace(&self) -> Duration {
        Duration::from_secs(self.late_fill_grace_secs)
    }
}

const fn default_mode() -> TradingMode {
    TradingMode::Paper
}

const fn default_max_daily_trades() -> u32 {
    20
}

const fn default_max_symbol_trades() -> u32 {
    5
}

fn default_max_daily_loss() -> Decimal {
    dec!(1000)
}

const fn default_execution_window_secs() -> u64 {
    30
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_late_fill_grace_secs() -> u64 {
    60
}

fn default_reconciliation_price_epsilon() -> Decimal {
    dec!(0.01)
}

/// Load configuration from a YAML file, falling back to defaults when the
/// default path does not exist.
///
/// The `TRADING_MODE` environment variable, when set, overrides the
/// configured mode.
///
/// # Errors
///
/// Returns an error when an explicitly given path cannot be read, the YAML
/// is malformed, or validation fails.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => {
            if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
                parse_file(DEFAULT_CONFIG_PATH)?
            } else {
                Config::default()
            }
        }
    };

    if let Ok(mode) = std::env::var("TRADING_MODE") {
        config.mode = mode
            .parse()
            .map_err(ConfigError::ValidationError)?;
    }

    config.validate()?;
    Ok(config)
}

fn parse_file(path: &str) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_string(),
        source,
    })?;
    Ok(serde_yaml_bw::from_str(&content)?)
}
