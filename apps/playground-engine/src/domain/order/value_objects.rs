//! Order value objects: side, status, type, duration, class.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
///
/// `Buy` and `SellShort` open (or extend) a position; `Sell` and
/// `BuyToCover` close one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    /// Buy to open or extend a long.
    Buy,
    /// Sell to close a long.
    Sell,
    /// Buy to close a short.
    BuyToCover,
    /// Sell to open or extend a short.
    SellShort,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    #[must_use]
    pub const fn sign(&self) -> Decimal {
        match self {
            Self::Buy | Self::BuyToCover => Decimal::ONE,
            Self::Sell | Self::SellShort => Decimal::NEGATIVE_ONE,
        }
    }

    /// Apply the side's sign to an absolute quantity.
    #[must_use]
    pub fn signed(&self, absolute_quantity: Decimal) -> Decimal {
        absolute_quantity * self.sign()
    }

    /// Returns true for sides that open a position.
    #[must_use]
    pub const fn is_opening(&self) -> bool {
        matches!(self, Self::Buy | Self::SellShort)
    }

    /// Returns true for buy-side orders.
    #[must_use]
    pub const fn is_buy(&self) -> bool {
        matches!(self, Self::Buy | Self::BuyToCover)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::BuyToCover => "buy_to_cover",
            Self::SellShort => "sell_short",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Newly placed, not yet accepted.
    Pending,
    /// Accepted by the reconciler or the simulator book.
    Open,
    /// Completely filled.
    Filled,
    /// Some, but not all, quantity filled.
    PartiallyFilled,
    /// Rejected by checks or the broker.
    Rejected,
    /// Canceled.
    Canceled,
    /// Expired (e.g. a day order at session close).
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Rejected | Self::Canceled | Self::Expired
        )
    }

    /// Returns true if the order can still receive fills.
    #[must_use]
    pub const fn is_trading_allowed(&self) -> bool {
        matches!(self, Self::Pending | Self::Open | Self::PartiallyFilled)
    }

    /// Returns true for `pending` or `open`.
    #[must_use]
    pub const fn is_open_or_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::Open)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Filled => "filled",
            Self::PartiallyFilled => "partially_filled",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "open" => Ok(Self::Open),
            "filled" => Ok(Self::Filled),
            "partially_filled" | "partiallyFilled" => Ok(Self::PartiallyFilled),
            "rejected" => Ok(Self::Rejected),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order.
    Market,
    /// Limit order.
    Limit,
    /// Stop order.
    Stop,
    /// Stop-limit order.
    StopLimit,
}

impl OrderType {
    /// Returns true if a limit price is required.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Returns true if a stop price is required.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
            Self::Stop => write!(f, "stop"),
            Self::StopLimit => write!(f, "stop_limit"),
        }
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDuration {
    /// Valid for the current session.
    #[default]
    Day,
    /// Good till canceled.
    Gtc,
}

/// Asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderClass {
    /// Equity order.
    #[default]
    Equity,
    /// Option order.
    Option,
}

impl fmt::Display for OrderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "equity"),
            Self::Option => write!(f, "option"),
        }
    }
}
