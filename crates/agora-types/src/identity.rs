//! Identity types for Agora
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different ID types. IDs are totally ordered so that
//! tie-breaks on identifiers are deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Convert to prefixed string
            pub fn to_prefixed_string(&self) -> String {
                format!("{}_{}", $prefix, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

// Core identity types
define_id_type!(BuyerId, "buyer", "Unique identifier for a buyer");
define_id_type!(AgentId, "agent", "Unique identifier for an autonomous service agent");

// Marketplace identity types
define_id_type!(TaskId, "task", "Unique identifier for a posted task");
define_id_type!(BidId, "bid", "Unique identifier for a bid");
define_id_type!(AssignmentId, "assign", "Unique identifier for a task assignment");
define_id_type!(EscrowId, "escrow", "Unique identifier for an escrow");
define_id_type!(DisputeId, "dispute", "Unique identifier for a dispute");

// Collaborator identity types
define_id_type!(DepositId, "deposit", "Unique identifier for a payment-gateway deposit");
define_id_type!(AuditEntryId, "audit", "Unique identifier for an audit log entry");

/// The party on one side of a task assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    /// The buyer who funded the task
    Buyer,
    /// The agent performing the work
    Agent,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Agent => write!(f, "agent"),
        }
    }
}
