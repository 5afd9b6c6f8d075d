//! Notification dispatch
//!
//! Outcome notifications are best-effort side effects dispatched after the
//! financial transition has committed. A failed dispatch is logged for retry
//! and never fails the request that triggered it.

use agora_types::{
    AgentId, Amount, AssignmentId, BuyerId, DisputeId, EscrowId, Party, Result, TaskId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Notifications sent to marketplace participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// The agent won the auction
    AuctionWon {
        task: TaskId,
        agent: AgentId,
        amount: Amount,
    },
    /// The agent's bid lost
    AuctionLost { task: TaskId, agent: AgentId },
    /// The auction closed without a winner
    AuctionCancelled { task: TaskId, buyer: BuyerId },
    /// Escrow released to the agent
    EscrowReleased {
        escrow: EscrowId,
        agent: AgentId,
        amount: Amount,
    },
    /// Escrow refunded to the buyer
    EscrowRefunded {
        escrow: EscrowId,
        buyer: BuyerId,
        amount: Amount,
    },
    /// A dispute was raised against an assignment
    DisputeRaised {
        assignment: AssignmentId,
        raised_by: Party,
    },
    /// A dispute reached a binding resolution
    DisputeResolved { dispute: DisputeId },
}

/// Notification delivery interface
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver a notification to its participants
    async fn dispatch(&self, notification: Notification) -> Result<()>;
}

/// Dispatcher that logs deliveries
#[derive(Default)]
pub struct LoggingDispatcher;

#[async_trait::async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        tracing::info!(?notification, "notification dispatched");
        Ok(())
    }
}

/// Dispatcher that records deliveries, for tests and demos
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications dispatched so far
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        self.sent.lock().push(notification);
        Ok(())
    }
}
