//! Broker Port (Driven Port)
//!
//! Interface to the brokerage behind a reconcile playground. Only reconcile
//! orders are ever routed through it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderDuration, OrderRecord, OrderSide, OrderType};
use crate::domain::shared::{ExternalOrderId, Instrument, LiveAccountType};

/// Order status as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    /// Received, not yet working.
    Pending,
    /// Working at the exchange.
    Open,
    /// Some quantity filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Rejected by the broker.
    Rejected,
    /// Canceled.
    Canceled,
    /// Expired.
    Expired,
}

impl BrokerOrderStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for BrokerOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerOrderStatus {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "open" => Ok(Self::Open),
            "partially_filled" | "partial" => Ok(Self::PartiallyFilled),
            "filled" => Ok(Self::Filled),
            "rejected" => Ok(Self::Rejected),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            _ => Err(BrokerError::UnknownOrderStatus {
                status: s.to_string(),
            }),
        }
    }
}

/// Broker view of one order.
///
/// `status` is kept as the broker's text; callers parse it with
/// [`OrderSnapshot::parsed_status`] so an unknown status surfaces as an error
/// at the point of use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Broker order id.
    pub id: ExternalOrderId,
    /// Status text.
    pub status: String,
    /// Average fill price.
    pub avg_fill_price: Decimal,
    /// Quantity of the latest fill.
    pub last_fill_quantity: Decimal,
    /// Broker's explanation for a rejection or cancel.
    #[serde(default)]
    pub reason_description: Option<String>,
    /// When the broker created the order.
    pub create_date: DateTime<Utc>,
}

impl OrderSnapshot {
    /// A snapshot with no fills yet.
    #[must_use]
    pub fn new(id: ExternalOrderId, status: BrokerOrderStatus, create_date: DateTime<Utc>) -> Self {
        Self {
            id,
            status: status.as_str().to_string(),
            avg_fill_price: Decimal::ZERO,
            last_fill_quantity: Decimal::ZERO,
            reason_description: None,
            create_date,
        }
    }

    /// Record a fill.
    #[must_use]
    pub fn filled(mut self, price: Decimal, quantity: Decimal) -> Self {
        self.status = BrokerOrderStatus::Filled.as_str().to_string();
        self.avg_fill_price = price;
        self.last_fill_quantity = quantity;
        self
    }

    /// Record a rejection.
    #[must_use]
    pub fn rejected(mut self, reason: impl Into<String>) -> Self {
        self.status = BrokerOrderStatus::Rejected.as_str().to_string();
        self.reason_description = Some(reason.into());
        self
    }

    /// Parse the status text.
    pub fn parsed_status(&self) -> Result<BrokerOrderStatus, BrokerError> {
        self.status.parse()
    }
}

/// Position held at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Instrument.
    pub symbol: Instrument,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Average cost.
    pub cost_basis: Decimal,
}

/// Broker account type as reported by `fetch_equity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerAccountType {
    /// Margin account.
    Margin,
    /// Pattern day trader account.
    Pdt,
    /// Anything else (cash, IRA, ...).
    Other(String),
}

impl BrokerAccountType {
    /// Returns true for account types a reconcile playground can mirror.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::Margin | Self::Pdt)
    }
}

impl fmt::Display for BrokerAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Margin => f.write_str("margin"),
            Self::Pdt => f.write_str("pdt"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

impl FromStr for BrokerAccountType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "margin" => Self::Margin,
            "pdt" => Self::Pdt,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Account balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    /// Total equity.
    pub equity: Decimal,
    /// Unrealized P&L.
    pub open_pl: Decimal,
    /// Realized P&L for the day.
    pub close_pl: Decimal,
    /// Account type.
    pub account_type: BrokerAccountType,
}

/// Top-of-book quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerQuote {
    /// Instrument.
    pub symbol: Instrument,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Last trade price.
    pub last: Decimal,
}

impl BrokerQuote {
    /// Price used as the requested price of a live order.
    #[must_use]
    pub fn price_for(&self, side: OrderSide) -> Decimal {
        let quoted = if side.is_buy() { self.ask } else { self.bid };
        if quoted > Decimal::ZERO {
            quoted
        } else {
            self.last
        }
    }
}

/// Request to route an equity order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceEquityTradeRequest {
    /// Instrument.
    pub symbol: Instrument,
    /// Side.
    pub side: OrderSide,
    /// Absolute quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Duration.
    pub duration: OrderDuration,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Stop price.
    pub stop_price: Option<Decimal>,
    /// Tag passed through to the broker.
    pub tag: String,
    /// Account the order is booked against.
    pub account_type: LiveAccountType,
}

impl PlaceEquityTradeRequest {
    /// Request for a reconcile order.
    #[must_use]
    pub fn from_order(order: &OrderRecord) -> Self {
        Self {
            symbol: order.symbol().clone(),
            side: order.side(),
            quantity: order.absolute_quantity(),
            order_type: order.order_type(),
            duration: order.duration(),
            limit_price: order.limit_price(),
            stop_price: order.stop_price(),
            tag: order.tag().to_string(),
            account_type: order.account_type(),
        }
    }
}

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Connection error.
    #[error("broker connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// The request did not complete in time.
    #[error("broker request timed out after {seconds}s")]
    Timeout {
        /// Timeout applied.
        seconds: u64,
    },

    /// Rate limited.
    #[error("rate limited by broker")]
    RateLimited,

    /// Order rejected at submission.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The missing order id.
        order_id: String,
    },

    /// Status text the engine does not understand.
    #[error("unknown order status from broker: {status}")]
    UnknownOrderStatus {
        /// Status text.
        status: String,
    },

    /// Account type a reconcile playground cannot mirror.
    #[error("unsupported account type: {account_type}")]
    UnsupportedAccountType {
        /// Reported account type.
        account_type: String,
    },

    /// Unknown error.
    #[error("broker error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

impl BrokerError {
    /// Transient errors are retried on the next poll and never surfaced.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::Timeout { .. } | Self::RateLimited
        )
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Broker name, matched against `LiveSource::broker`.
    fn name(&self) -> &str;

    /// Fetch one order.
    async fn fetch_order(
        &self,
        external_id: &ExternalOrderId,
        account_type: LiveAccountType,
    ) -> Result<OrderSnapshot, BrokerError>;

    /// Fetch every order the broker knows about.
    async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, BrokerError>;

    /// Fetch open positions.
    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Fetch account balances.
    async fn fetch_equity(&self) -> Result<EquitySnapshot, BrokerError>;

    /// Fetch quotes.
    async fn fetch_quotes(&self, symbols: &[Instrument]) -> Result<Vec<BrokerQuote>, BrokerError>;

    /// Route an order. Returns the broker's id for it.
    async fn place_order(
        &self,
        request: PlaceEquityTradeRequest,
    ) -> Result<ExternalOrderId, BrokerError>;
}
