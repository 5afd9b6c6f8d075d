//! Agora Types - Canonical domain types for the agent work marketplace
//!
//! This crate contains all foundational types for Agora with zero dependencies
//! on other agora crates. It defines the complete type system for:
//!
//! - Identity types (TaskId, AgentId, EscrowId, etc.)
//! - Currency and amount types with 18-decimal precision
//! - Task and auction types
//! - Bid, assignment, escrow, and dispute types
//!
//! # Money-Safety Invariants
//!
//! These types support the core marketplace invariants:
//!
//! 1. Escrow is monotonic: once Released or Refunded it is terminal
//! 2. At most one Active bid per (task, agent) pair
//! 3. An Assignment is created exactly once per task
//! 4. At most one Open dispute per assignment

pub mod identity;
pub mod currency;
pub mod amount;
pub mod task;
pub mod bid;
pub mod assignment;
pub mod escrow;
pub mod dispute;
pub mod error;

pub use identity::*;
pub use currency::*;
pub use amount::*;
pub use task::*;
pub use bid::*;
pub use assignment::*;
pub use escrow::*;
pub use dispute::*;
pub use error::*;

/// Version of the Agora types schema
pub const TYPES_VERSION: &str = "0.1.0";

/// Temporal anchor for causal ordering
///
/// Bid submission order must be unambiguous even when two bids land in the
/// same millisecond, so the ledger pairs the wall-clock timestamp with a
/// sequence number it assigns itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TemporalAnchor {
    /// Millisecond timestamp
    pub timestamp: i64,
    /// Sequence number for ordering within the same timestamp
    pub sequence: u64,
}

impl TemporalAnchor {
    /// Create a new temporal anchor at the current time
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            sequence: 0,
        }
    }

    /// Create a new temporal anchor with explicit values
    pub fn new(timestamp: i64, sequence: u64) -> Self {
        Self { timestamp, sequence }
    }

    /// Create the next anchor in sequence
    pub fn next(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            sequence: self.sequence + 1,
        }
    }
}

impl Default for TemporalAnchor {
    fn default() -> Self {
        Self::now()
    }
}
