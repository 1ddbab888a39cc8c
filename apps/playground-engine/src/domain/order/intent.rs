//! Order intent: what a caller asks a playground to do.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{OrderClass, OrderDuration, OrderSide, OrderType};
use crate::domain::shared::Instrument;

/// Maximum tag length accepted from callers.
pub const MAX_TAG_LENGTH: usize = 255;

/// A validated-on-demand order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Asset class.
    #[serde(default)]
    pub class: OrderClass,
    /// Side.
    pub side: OrderSide,
    /// Instrument.
    pub symbol: Instrument,
    /// Absolute (unsigned) quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Time in force.
    #[serde(default)]
    pub duration: OrderDuration,
    /// Limit price, required iff the type is limit or stop-limit.
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop price, required iff the type is stop or stop-limit.
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Free-form tag.
    #[serde(default)]
    pub tag: String,
}

impl OrderIntent {
    /// A day market order for an equity.
    #[must_use]
    pub fn market(symbol: impl Into<Instrument>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            class: OrderClass::Equity,
            side,
            symbol: symbol.into(),
            quantity,
            order_type: OrderType::Market,
            duration: OrderDuration::Day,
            limit_price: None,
            stop_price: None,
            tag: String::new(),
        }
    }

    /// A day limit order for an equity.
    #[must_use]
    pub fn limit(
        symbol: impl Into<Instrument>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// A day stop order for an equity.
    #[must_use]
    pub fn stop(
        symbol: impl Into<Instrument>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Set the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set the time in force.
    #[must_use]
    pub const fn with_duration(mut self, duration: OrderDuration) -> Self {
        self.duration = duration;
        self
    }

    /// Signed quantity derived from the side.
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.quantity)
    }

    /// Validate the intent.
    ///
    /// Symbol non-empty, quantity positive, limit price present iff limit or
    /// stop-limit, stop price present iff stop or stop-limit, prices positive,
    /// tag well-formed.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }

        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::NonPositiveQuantity {
                quantity: self.quantity,
            });
        }

        check_price(
            "limit_price",
            self.order_type,
            self.order_type.requires_limit_price(),
            self.limit_price,
        )?;
        check_price(
            "stop_price",
            self.order_type,
            self.order_type.requires_stop_price(),
            self.stop_price,
        )?;

        validate_tag(&self.tag)
    }
}

/// Validate a caller-supplied tag: at most 255 characters from `[A-Za-z0-9-]`.
pub fn validate_tag(tag: &str) -> Result<(), OrderError> {
    let well_formed = tag.len() <= MAX_TAG_LENGTH
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(OrderError::InvalidTag {
            tag: tag.to_string(),
        })
    }
}

fn check_price(
    field: &'static str,
    order_type: OrderType,
    required: bool,
    price: Option<Decimal>,
) -> Result<(), OrderError> {
    let message = match (required, price) {
        (true, None) => "is required",
        (false, Some(_)) => "is not allowed",
        (true, Some(p)) if p <= Decimal::ZERO => "must be positive",
        _ => return Ok(()),
    };
    Err(OrderError::InvalidPrice {
        field,
        order_type,
        message,
    })
}
