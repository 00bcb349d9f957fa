//! Broker capability contract.
//!
//! The engine never talks to a broker API directly; it talks to this trait.
//! Test doubles and the in-process paper broker implement the same interface
//! as a real adapter would.

mod paper;
mod retry;

pub use paper::{PaperBroker, PaperBrokerConfig};
pub use retry::{BackoffCalculator, RetryPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::FrozenSnapshot;

/// Errors from broker operations.
///
/// Any adapter failure is surfaced here and treated fail-closed by callers;
/// nothing is silently ignored.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Transport-level failure (connection, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Broker API returned an error.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from broker.
        code: String,
        /// Error message from broker.
        message: String,
    },

    /// Order was rejected.
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Order cannot be canceled (already in terminal state).
    #[error("Order cannot be canceled: {0}")]
    OrderNotCancelable(String),

    /// Broker is unhealthy or unreachable.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// Whether resubmitting the same order may succeed.
    ///
    /// Transport faults, rate limits, and unavailability are transient;
    /// explicit rejections and API errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

/// Broker-side order status, as reported by the authoritative status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerOrderStatus {
    /// Acknowledged, not yet filled.
    Accepted,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Canceled,
    /// Rejected.
    Rejected,
}

impl BrokerOrderStatus {
    /// Returns true if no further broker-side changes are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

impl std::fmt::Display for BrokerOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Accepted => "ACCEPTED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{name}")
    }
}

/// Acknowledgment of an accepted order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Broker's order ID.
    pub broker_order_id: String,
    /// Acknowledgment timestamp.
    pub acked_at: DateTime<Utc>,
}

/// The broker's authoritative view of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderSnapshot {
    /// Broker's order ID.
    pub broker_order_id: String,
    /// Current status.
    pub status: BrokerOrderStatus,
    /// Average fill price, if any quantity filled.
    pub fill_price: Option<Decimal>,
    /// Filled quantity so far.
    pub fill_quantity: Decimal,
}

/// Trait for broker adapters.
///
/// Implementations must treat every internal failure as an explicit
/// [`BrokerError`]; callers fail closed on any `Err`.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Place an order built from a frozen snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the order or the call fails.
    async fn place_order(&self, snapshot: &FrozenSnapshot) -> Result<OrderAck, BrokerError>;

    /// Request cancellation of an order.
    ///
    /// Cancellation is advisory: the order may already be filled, and a fill
    /// racing the cancel is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is unknown, already terminal, or the
    /// call fails.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    /// Query the broker's authoritative record of an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is unknown or the call fails.
    async fn order_status(&self, broker_order_id: &str)
    -> Result<BrokerOrderSnapshot, BrokerError>;

    /// Lightweight health probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker is unreachable or degraded; callers
    /// treat any error identically to an explicit unhealthy signal.
    async fn health_check(&self) -> Result<(), BrokerError>;

    /// Broker name for logging.
    fn broker_name(&self) -> &'static str;
}
