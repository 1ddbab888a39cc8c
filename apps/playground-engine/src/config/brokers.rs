//! Broker configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BrokersConfig {
    /// In-process mock broker.
    #[serde(default)]
    pub mock: MockBrokerConfig,
}

/// Mock broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBrokerConfig {
    /// Use the mock broker.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Equity reported by the account.
    #[serde(default = "default_equity")]
    pub equity: Decimal,
    /// Account type reported by the account: `margin`, `pdt`, or `cash`.
    #[serde(default = "default_account_type")]
    pub account_type: String,
    /// Price quoted for symbols without a scripted quote. Zero disables
    /// default quotes.
    #[serde(default = "default_quote_price")]
    pub quote_price: Decimal,
    /// Fill every routed order at the quote as soon as it is placed.
    #[serde(default)]
    pub auto_fill: bool,
}

impl Default for MockBrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            equity: default_equity(),
            account_type: default_account_type(),
            quote_price: default_quote_price(),
            auto_fill: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_equity() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_account_type() -> String {
    "margin".to_string()
}

fn default_quote_price() -> Decimal {
    Decimal::new(100, 0)
}
