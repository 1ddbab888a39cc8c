//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up IDs from different contexts.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(PlaygroundId, "Unique identifier for a playground (UUID).");
define_id!(OrderId, "Surrogate identifier for an order record.");
define_id!(TradeId, "Unique identifier for a fill.");
define_id!(ExternalOrderId, "Broker's identifier for a routed order.");

/// Address of an order in the arena: the owning playground plus the order id.
///
/// Cross-playground links (`reconciles[]`) are expressed as `OrderRef`s and
/// resolved at read time; no pointer cycles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    /// Playground owning the order.
    pub playground_id: PlaygroundId,
    /// Order within that playground.
    pub order_id: OrderId,
}

impl OrderRef {
    /// Create a new order reference.
    #[must_use]
    pub const fn new(playground_id: PlaygroundId, order_id: OrderId) -> Self {
        Self {
            playground_id,
            order_id,
        }
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.playground_id, self.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playground_id_new_and_display() {
        let id = PlaygroundId::new("pg-123");
        assert_eq!(id.as_str(), "pg-123");
        assert_eq!(format!("{id}"), "pg-123");
    }

    #[test]
    fn order_id_generate_is_unique() {
        let id1 = OrderId::generate();
        let id2 = OrderId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn generated_playground_id_is_uuid() {
        let id = PlaygroundId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn external_id_from_string() {
        let id: ExternalOrderId = "brk-1".into();
        assert_eq!(id.as_str(), "brk-1");

        let id: ExternalOrderId = String::from("brk-2").into();
        assert_eq!(id.into_inner(), "brk-2");
    }

    #[test]
    fn order_ref_display_and_ordering() {
        let a = OrderRef::new(PlaygroundId::new("a"), OrderId::new("1"));
        let b = OrderRef::new(PlaygroundId::new("b"), OrderId::new("0"));
        assert_eq!(a.to_string(), "a/1");
        assert!(a < b);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = TradeId::new("t-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t-1\"");
    }
}
