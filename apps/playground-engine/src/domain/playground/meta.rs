//! Playground metadata and per-environment capabilities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::PlaygroundError;
use crate::domain::shared::{LiveAccountType, PlaygroundId};

/// Where a playground's ticks and fills come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Historical bars, synthetic fills.
    Simulator,
    /// Live feed, fills mirrored from a reconcile playground.
    Live,
    /// Shadow of a real broker account.
    Reconcile,
}

impl Environment {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simulator => "simulator",
            Self::Live => "live",
            Self::Reconcile => "reconcile",
        }
    }

    /// Behaviours that differ per environment.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        match self {
            Self::Simulator => Capabilities {
                synthetic_fills: true,
                perform_checks: true,
                ticks: true,
                previews: true,
                mirrors_orders: false,
            },
            Self::Live => Capabilities {
                synthetic_fills: false,
                perform_checks: false,
                ticks: true,
                previews: false,
                mirrors_orders: true,
            },
            Self::Reconcile => Capabilities {
                synthetic_fills: false,
                perform_checks: false,
                ticks: false,
                previews: false,
                mirrors_orders: false,
            },
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulator" => Ok(Self::Simulator),
            "live" => Ok(Self::Live),
            "reconcile" => Ok(Self::Reconcile),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Capability table for a playground environment.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Orders are filled by the tick loop rather than a broker.
    pub synthetic_fills: bool,
    /// Default for `perform_checks` on placement and fills.
    pub perform_checks: bool,
    /// `tick` is available.
    pub ticks: bool,
    /// `tick` with `is_preview` is available.
    pub previews: bool,
    /// Placement spawns reconcile orders.
    pub mirrors_orders: bool,
}

/// Broker account a live or reconcile playground is attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LiveSource {
    /// Broker name.
    pub broker: String,
    /// Broker account id.
    pub account_id: String,
    /// Account type.
    pub account_type: LiveAccountType,
}

impl fmt::Display for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.broker, self.account_id, self.account_type)
    }
}

/// Immutable playground metadata, validated at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Environment.
    pub environment: Environment,
    /// Clock start.
    pub start_at: DateTime<Utc>,
    /// Clock end; absent for live and reconcile playgrounds.
    pub end_at: Option<DateTime<Utc>>,
    /// Balance at creation.
    pub starting_balance: Decimal,
    /// Broker account, for live and reconcile playgrounds.
    #[serde(default)]
    pub source: Option<LiveSource>,
    /// Reconcile playground, for live playgrounds.
    #[serde(default)]
    pub reconcile_playground_id: Option<PlaygroundId>,
    /// Caller-chosen id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Meta {
    /// Validate the metadata for its environment.
    pub fn validate(&self) -> Result<(), PlaygroundError> {
        if self.starting_balance < Decimal::ZERO {
            return Err(invalid("starting balance must not be negative"));
        }

        match self.environment {
            Environment::Simulator => {
                let Some(end_at) = self.end_at else {
                    return Err(invalid("simulator playgrounds need an end date"));
                };
                if self.start_at >= end_at {
                    return Err(invalid("start date must be before end date"));
                }
            }
            Environment::Live => {
                if self.source.is_none() {
                    return Err(invalid("live playgrounds need a source account"));
                }
                if self.reconcile_playground_id.is_none() {
                    return Err(invalid("live playgrounds need a reconcile playground"));
                }
            }
            Environment::Reconcile => {
                if self.source.is_none() {
                    return Err(invalid("reconcile playgrounds need a source account"));
                }
            }
        }

        Ok(())
    }

    /// Account type orders in this playground are booked against.
    #[must_use]
    pub fn live_account_type(&self) -> LiveAccountType {
        match (self.environment, &self.source) {
            (Environment::Simulator, _) | (_, None) => LiveAccountType::Simulator,
            (Environment::Reconcile, Some(_)) => LiveAccountType::Reconciliation,
            (Environment::Live, Some(source)) => source.account_type,
        }
    }

    /// Returns true if every tag in `tags` is present.
    #[must_use]
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

fn invalid(message: &str) -> PlaygroundError {
    PlaygroundError::InvalidMeta(message.to_string())
}
