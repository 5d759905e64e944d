//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `RunId` where a `BatchId`
//! is expected. The registry-assigned request identifier is an opaque string
//! owned by the remote service and gets its own newtype.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(RunId, "Unique identifier for a reconciliation run.");
typed_id!(BatchId, "Unique identifier for one flattening batch.");

/// Registry-assigned identifier of a bulk-export request.
///
/// The remote service mints this value; it is never parsed or interpreted
/// locally beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Wraps a registry-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_ids_are_distinct_types() {
        let run = RunId::new();
        let batch = BatchId::new();
        // Compile-time distinction; runtime values are independent UUIDs.
        assert_ne!(run.into_inner(), batch.into_inner());
    }

    #[test]
    fn test_run_id_round_trips_through_string() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("valid uuid");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new("4e80345d-917f-4bf0-a257-5a2902c03a7f");
        assert_eq!(id.as_str(), "4e80345d-917f-4bf0-a257-5a2902c03a7f");
        assert_eq!(id.to_string(), id.as_str());
    }
}
