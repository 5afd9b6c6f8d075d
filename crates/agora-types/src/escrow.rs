//! Escrow types for Agora
//!
//! Buyer funds never move directly to an agent. They are held against the
//! task and reach exactly one terminal outcome: released, refunded, or
//! resolved by a dispute.

use crate::{AgentId, Amount, AssignmentId, BuyerId, EscrowId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Funds locked against the task
    Held,
    /// Funds credited to the winning agent
    Released,
    /// Funds returned to the buyer
    Refunded,
    /// Frozen pending dispute resolution
    Disputed,
    /// Settled by a binding dispute resolution
    Resolved,
}

impl EscrowStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Resolved)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Held => "held",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Disputed => "disputed",
            Self::Resolved => "resolved",
        };
        write!(f, "{}", s)
    }
}

/// Buyer funds held against a task
///
/// The assignment reference and payee are bound by the auction closer once a
/// winner exists; funding happens before the auction closes, so both start
/// out empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    /// Unique escrow ID
    pub id: EscrowId,
    /// The task the funds are held against
    pub task: TaskId,
    /// The assignment the funds settle, once one exists
    pub assignment: Option<AssignmentId>,
    /// Buyer who funded the escrow
    pub payer: BuyerId,
    /// Winning agent entitled to the funds, once bound
    pub payee: Option<AgentId>,
    /// Amount held
    pub amount: Amount,
    /// Current status
    pub status: EscrowStatus,
    /// Whether revenue counters have been credited for this escrow
    pub credited: bool,
    /// Whether funds have left the platform rails
    pub settled_externally: bool,
    /// When the escrow was created
    pub created_at: DateTime<Utc>,
    /// When the escrow was last updated
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    /// Create a new held escrow for a funded task
    pub fn new(task: TaskId, payer: BuyerId, amount: Amount) -> Self {
        let now = Utc::now();
        Self {
            id: EscrowId::new(),
            task,
            assignment: None,
            payer,
            payee: None,
            amount,
            status: EscrowStatus::Held,
            credited: false,
            settled_externally: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-agent revenue counters, credited exactly once per settled escrow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueStats {
    /// Total earned, one entry per currency
    pub earned: Vec<Amount>,
    /// Number of payouts received
    pub payouts: u64,
}

impl RevenueStats {
    /// Credit a payout, merging into the matching currency bucket
    pub fn credit(&mut self, amount: Amount) {
        self.payouts += 1;
        self.add(amount);
    }

    /// Reverse a previously credited payout
    pub fn claw_back(&mut self, amount: Amount) {
        self.payouts = self.payouts.saturating_sub(1);
        self.add(Amount::new(-amount.value, amount.currency));
    }

    /// Total earned in a given currency
    pub fn earned_in(&self, currency: crate::Currency) -> Amount {
        self.earned
            .iter()
            .find(|a| a.currency == currency)
            .copied()
            .unwrap_or(Amount::zero(currency))
    }

    fn add(&mut self, amount: Amount) {
        match self.earned.iter_mut().find(|a| a.currency == amount.currency) {
            Some(bucket) => bucket.value += amount.value,
            None => self.earned.push(amount),
        }
    }
}
