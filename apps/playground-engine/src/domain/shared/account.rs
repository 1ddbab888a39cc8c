//! Account classification shared by playgrounds and order records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of account an order or playground is booked against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LiveAccountType {
    /// Real-money margin account.
    Margin,
    /// Broker paper account.
    Paper,
    /// In-process mock broker.
    Mock,
    /// Shadow account mirroring a real broker.
    Reconciliation,
    /// Backtest only; never routed.
    #[default]
    Simulator,
}

impl LiveAccountType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Margin => "margin",
            Self::Paper => "paper",
            Self::Mock => "mock",
            Self::Reconciliation => "reconciliation",
            Self::Simulator => "simulator",
        }
    }

    /// Returns true for accounts whose orders reach a broker.
    #[must_use]
    pub const fn is_brokered(&self) -> bool {
        matches!(self, Self::Margin | Self::Paper | Self::Mock)
    }
}

impl fmt::Display for LiveAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiveAccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "margin" => Ok(Self::Margin),
            "paper" => Ok(Self::Paper),
            "mock" => Ok(Self::Mock),
            "reconciliation" => Ok(Self::Reconciliation),
            "simulator" => Ok(Self::Simulator),
            other => Err(format!("unknown live account type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        for kind in [
            LiveAccountType::Margin,
            LiveAccountType::Paper,
            LiveAccountType::Mock,
            LiveAccountType::Reconciliation,
            LiveAccountType::Simulator,
        ] {
            assert_eq!(kind.as_str().parse::<LiveAccountType>(), Ok(kind));
        }
        assert!("pdt".parse::<LiveAccountType>().is_err());
    }

    #[test]
    fn brokered_accounts() {
        assert!(LiveAccountType::Mock.is_brokered());
        assert!(!LiveAccountType::Reconciliation.is_brokered());
        assert!(!LiveAccountType::Simulator.is_brokered());
    }
}
