//! Task and auction types for Agora
//!
//! A task is the unit of brokered work: the buyer funds it, agents compete
//! for it, and its status is the single source of truth for which operations
//! are legal at any moment.

use crate::{Amount, BuyerId, EscrowId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Funded and accepting bids
    Open,
    /// Auction closed, winner bound
    Assigned,
    /// Winner has started work
    InProgress,
    /// Work accepted, escrow settled
    Completed,
    /// Outcome under contest
    Disputed,
    /// Closed without a winner
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// How the competitive process for a task is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionType {
    /// Bids are hidden from other bidders until close
    SealedBid,
    /// Bids are visible and may be superseded
    English,
    /// The buyer names the price; agents signal willingness
    FixedPrice,
}

/// Sensitivity class of the data a task exposes to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    /// Publicly available data
    Public,
    /// Internal business data
    Internal,
    /// Personally identifiable or commercially sensitive data
    Confidential,
    /// Regulated data requiring explicit clearance
    Restricted,
}

/// Requirements an agent must satisfy to bid on a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequirements {
    /// Skills the agent must cover
    pub skills: Vec<String>,
    /// Sensitivity class of the task's data
    pub data_class: DataClass,
    /// Region the agent must operate in
    pub region: String,
    /// Minimum trust score (0-100)
    pub min_trust_score: f64,
    /// Minimum stake the agent must have posted
    pub min_stake: Amount,
}

impl TaskRequirements {
    /// Requirements that any registered agent satisfies
    pub fn open_to_all(stake_currency: crate::Currency) -> Self {
        Self {
            skills: Vec::new(),
            data_class: DataClass::Public,
            region: "global".to_string(),
            min_trust_score: 0.0,
            min_stake: Amount::zero(stake_currency),
        }
    }
}

/// A funded task posted by a buyer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,
    /// Owning buyer
    pub buyer: BuyerId,
    /// Short human-readable title
    pub title: String,
    /// Current status
    pub status: TaskStatus,
    /// Budget held in escrow
    pub budget: Amount,
    /// Requirements for bidders
    pub requirements: TaskRequirements,
    /// How the auction is run
    pub auction_type: AuctionType,
    /// When the auction stops accepting bids (None until opened)
    pub auction_ends_at: Option<DateTime<Utc>>,
    /// Escrow holding the budget
    pub escrow: EscrowId,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new open task backed by an escrow
    pub fn new(
        id: TaskId,
        buyer: BuyerId,
        title: String,
        budget: Amount,
        requirements: TaskRequirements,
        auction_type: AuctionType,
        escrow: EscrowId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            buyer,
            title,
            status: TaskStatus::Open,
            budget,
            requirements,
            auction_type,
            auction_ends_at: None,
            escrow,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the auction is currently accepting bids
    pub fn accepting_bids(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Open
            && matches!(self.auction_ends_at, Some(ends_at) if now < ends_at)
    }

    /// Check if the auction deadline has passed
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.auction_ends_at, Some(ends_at) if now >= ends_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Currency;
    use chrono::Duration;

    fn test_task() -> Task {
        Task::new(
            TaskId::new(),
            BuyerId::new(),
            "Label a dataset".to_string(),
            Amount::usd(100.0),
            TaskRequirements::open_to_all(Currency::USD),
            AuctionType::SealedBid,
            EscrowId::new(),
        )
    }

    #[test]
    fn test_new_task_is_open_without_deadline() {
        let task = test_task();
        assert_eq!(task.status, TaskStatus::Open);
        assert!(task.auction_ends_at.is_none());
        assert!(!task.accepting_bids(Utc::now()));
    }

    #[test]
    fn test_accepting_bids_window() {
        let mut task = test_task();
        let now = Utc::now();
        task.auction_ends_at = Some(now + Duration::minutes(60));
        assert!(task.accepting_bids(now));
        assert!(!task.accepting_bids(now + Duration::minutes(61)));
        assert!(task.deadline_passed(now + Duration::minutes(61)));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Open.is_terminal());
        assert!(!TaskStatus::Disputed.is_terminal());
    }
}
