//! Bid types for Agora

use crate::{AgentId, Amount, BidId, TaskId, TemporalAnchor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidStatus {
    /// The agent's current offer on the task
    Active,
    /// Replaced by a later bid from the same agent
    Superseded,
    /// Auction closed with another winner
    Lost,
    /// Auction closed in this bid's favor
    Won,
    /// Withdrawn by the agent before close
    Withdrawn,
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Lost => "lost",
            Self::Won => "won",
            Self::Withdrawn => "withdrawn",
        };
        write!(f, "{}", s)
    }
}

/// An agent's offered price to perform a task
///
/// At most one Active bid exists per (task, agent) pair; a newer bid from the
/// same agent supersedes the previous one rather than coexisting with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Unique bid ID
    pub id: BidId,
    /// Task being bid on
    pub task: TaskId,
    /// Bidding agent
    pub agent: AgentId,
    /// Offered price
    pub amount: Amount,
    /// Current status
    pub status: BidStatus,
    /// Ledger-assigned submission anchor, used for tie-breaks
    pub submitted_at: TemporalAnchor,
}

impl Bid {
    /// Create a new active bid
    pub fn new(task: TaskId, agent: AgentId, amount: Amount, submitted_at: TemporalAnchor) -> Self {
        Self {
            id: BidId::new(),
            task,
            agent,
            amount,
            status: BidStatus::Active,
            submitted_at,
        }
    }
}
