//! Agora Auction - Ending an auction exactly once
//!
//! The closer drives the Open → Assigned (winner) or Open → Cancelled (no
//! bids) transition. The board's conditional status write is the arbiter
//! between concurrent callers (a manual close racing the periodic sweep),
//! so exactly one caller proceeds past step one and everything after it runs
//! unraced.
//!
//! Winner selection optimizes cost to the buyer: lowest amount wins, ties
//! broken by earliest submission, then higher trust score, then agent id.

use agora_bids::BidLedger;
use agora_board::{AssignmentBook, TaskBoard};
use agora_eligibility::EligibilityService;
use agora_escrow::EscrowLedger;
use agora_types::{AgentId, Assignment, Bid, Result, TaskId, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of tasks a single sweep pass will close
pub const DEFAULT_SWEEP_BATCH: usize = 10;

/// Result of closing one auction
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// A winner was selected and the assignment created
    Winner {
        assignment: Assignment,
        losers: Vec<AgentId>,
    },
    /// No active bids; the task was cancelled and the escrow refunded
    NoBids,
}

/// Per-task entry in a sweep batch report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    /// The task the sweep tried to close
    #[serde(rename = "taskId")]
    pub task: TaskId,
    /// Whether the close reached a terminal outcome
    pub success: bool,
    /// The winning agent, when there was one
    #[serde(rename = "winnerId")]
    pub winner: Option<AgentId>,
    /// Error code when the close failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The auction-closing state machine
pub struct AuctionCloser {
    board: Arc<TaskBoard>,
    assignments: Arc<AssignmentBook>,
    bids: Arc<BidLedger>,
    escrow: Arc<EscrowLedger>,
    eligibility: Arc<EligibilityService>,
}

impl AuctionCloser {
    pub fn new(
        board: Arc<TaskBoard>,
        assignments: Arc<AssignmentBook>,
        bids: Arc<BidLedger>,
        escrow: Arc<EscrowLedger>,
        eligibility: Arc<EligibilityService>,
    ) -> Self {
        Self {
            board,
            assignments,
            bids,
            escrow,
            eligibility,
        }
    }

    /// Close an auction, exactly once
    ///
    /// Any caller that loses the status compare-and-set observes
    /// `AuctionAlreadyClosed` and performs no further work.
    pub async fn close(&self, task_id: &TaskId) -> Result<CloseOutcome> {
        // The exactly-once gate. Claiming the Open -> Assigned edge also
        // stops the bid ledger from accepting further bids.
        let task = self
            .board
            .transition(task_id, TaskStatus::Open, TaskStatus::Assigned)?;

        let active = self.bids.active(task_id);
        if active.is_empty() {
            self.board
                .transition(task_id, TaskStatus::Assigned, TaskStatus::Cancelled)?;
            self.bids.mark_closed(task_id, None);
            self.escrow.refund(&task.escrow)?;
            info!(task = %task_id, "auction closed with no bids, task cancelled");
            return Ok(CloseOutcome::NoBids);
        }

        let winner = self.select_winner(active.clone()).await;
        let assignment =
            self.assignments
                .create(task_id.clone(), winner.agent.clone(), winner.amount)?;
        self.escrow
            .bind_assignment(&task.escrow, assignment.id.clone(), winner.agent.clone())?;
        self.bids.mark_closed(task_id, Some(&winner.id));

        let losers: Vec<AgentId> = active
            .iter()
            .filter(|b| b.id != winner.id)
            .map(|b| b.agent.clone())
            .collect();

        info!(
            task = %task_id,
            winner = %winner.agent,
            amount = %winner.amount,
            losers = losers.len(),
            "auction closed"
        );
        Ok(CloseOutcome::Winner { assignment, losers })
    }

    /// Close a bounded batch of expired auctions
    ///
    /// A failure on one task is recorded in its entry and does not abort the
    /// rest of the batch.
    pub async fn sweep(&self, limit: usize) -> Vec<SweepResult> {
        let expired = self.board.expired_open(Utc::now(), limit);
        let mut results = Vec::with_capacity(expired.len());
        for task_id in expired {
            let result = match self.close(&task_id).await {
                Ok(CloseOutcome::Winner { assignment, .. }) => SweepResult {
                    task: task_id,
                    success: true,
                    winner: Some(assignment.agent),
                    error: None,
                },
                Ok(CloseOutcome::NoBids) => SweepResult {
                    task: task_id,
                    success: true,
                    winner: None,
                    error: None,
                },
                Err(err) => {
                    warn!(task = %task_id, %err, "sweep failed to close task");
                    SweepResult {
                        task: task_id,
                        success: false,
                        winner: None,
                        error: Some(err.error_code().to_string()),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    /// Pick the winning bid: lowest amount, then earliest submission, then
    /// higher trust score, then ascending agent id
    async fn select_winner(&self, mut bids: Vec<Bid>) -> Bid {
        let mut trust: HashMap<AgentId, f64> = HashMap::new();
        for bid in &bids {
            if !trust.contains_key(&bid.agent) {
                let score = self.eligibility.tie_break_score(&bid.agent).await;
                trust.insert(bid.agent.clone(), score);
            }
        }

        bids.sort_by(|a, b| {
            a.amount
                .value
                .cmp(&b.amount.value)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                .then_with(|| {
                    let ta = trust.get(&a.agent).copied().unwrap_or(0.0);
                    let tb = trust.get(&b.agent).copied().unwrap_or(0.0);
                    tb.partial_cmp(&ta).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.agent.cmp(&b.agent))
        });
        bids.remove(0)
    }
}
