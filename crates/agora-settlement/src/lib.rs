//! Agora Settlement - The end-to-end task lifecycle
//!
//! The brokerage is the thin layer composing the board, bid ledger, auction
//! closer, escrow ledger, and dispute resolver into the lifecycle callers
//! see, and the only layer that talks to external collaborators. The rule
//! throughout: the financial transition commits first, then notifications,
//! reputation updates, payouts on external rails, and audit entries follow
//! best-effort; a collaborator outage degrades to a warning, never to a
//! corrupted ledger.

use agora_auction::{AuctionCloser, CloseOutcome, SweepResult, DEFAULT_SWEEP_BATCH};
use agora_bids::BidLedger;
use agora_board::{AssignmentBook, TaskBoard};
use agora_disputes::{DisputeResolver, Resolution};
use agora_eligibility::EligibilityService;
pub use agora_eligibility::EligibilityReport;
use agora_escrow::{EscrowLedger, Settlement};
use agora_registry::{
    bounded, AuditAction, AuditActor, AuditSink, DirectoryRegistry, InMemoryAuditLog,
    InMemoryDirectory, InMemoryGateway, InMemoryReputation, Notification, NotificationDispatcher,
    PaymentGateway, RecordingDispatcher, ReputationEvent, ReputationOracle,
};
use agora_types::{
    AgentId, AgoraError, Amount, Assignment, AuctionType, Bid, BidStatus, BuyerId, Dispute,
    DisputeEvidence, DisputeId, DisputeOutcome, Escrow, EscrowId, Party, Result, RevenueStats,
    Task, TaskId, TaskRequirements, TaskStatus,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators the brokerage consumes
pub struct Collaborators {
    pub directory: Arc<DirectoryRegistry>,
    pub reputation: Arc<dyn ReputationOracle>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub audit: Arc<dyn AuditSink>,
}

/// Snapshot returned by auction status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionStatus {
    /// The task as it stands
    pub task: Task,
    /// Number of currently active bids
    pub active_bids: usize,
    /// The assignment, once the auction closed with a winner
    pub assignment: Option<Assignment>,
}

/// The settlement orchestrator
pub struct Brokerage {
    board: Arc<TaskBoard>,
    assignments: Arc<AssignmentBook>,
    bids: Arc<BidLedger>,
    escrow: Arc<EscrowLedger>,
    closer: Arc<AuctionCloser>,
    disputes: Arc<DisputeResolver>,
    eligibility: Arc<EligibilityService>,
    notifier: Arc<dyn NotificationDispatcher>,
    gateway: Arc<dyn PaymentGateway>,
    reputation: Arc<dyn ReputationOracle>,
    audit: Arc<dyn AuditSink>,
    sweep_batch: usize,
}

impl Brokerage {
    pub fn new(collaborators: Collaborators) -> Self {
        let board = Arc::new(TaskBoard::new());
        let assignments = Arc::new(AssignmentBook::new());
        let eligibility = Arc::new(EligibilityService::new(
            collaborators.directory.clone(),
            collaborators.reputation.clone(),
        ));
        let bids = Arc::new(BidLedger::new(board.clone(), eligibility.clone()));
        let escrow = Arc::new(EscrowLedger::new());
        let closer = Arc::new(AuctionCloser::new(
            board.clone(),
            assignments.clone(),
            bids.clone(),
            escrow.clone(),
            eligibility.clone(),
        ));
        let disputes = Arc::new(DisputeResolver::new(
            board.clone(),
            assignments.clone(),
            escrow.clone(),
            collaborators.reputation.clone(),
        ));
        Self {
            board,
            assignments,
            bids,
            escrow,
            closer,
            disputes,
            eligibility,
            notifier: collaborators.notifier,
            gateway: collaborators.gateway,
            reputation: collaborators.reputation,
            audit: collaborators.audit,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }

    /// Fund a task: collect the buyer's deposit, hold it in escrow, and post
    /// the task open for bidding
    ///
    /// The deposit is the one collaborator call that must succeed before any
    /// state is created; a gateway outage surfaces to the caller.
    pub async fn fund_task(
        &self,
        buyer: BuyerId,
        title: String,
        budget: Amount,
        requirements: TaskRequirements,
        auction_type: AuctionType,
    ) -> Result<(Task, Escrow)> {
        if title.trim().is_empty() {
            return Err(AgoraError::invalid_input("title", "must not be empty"));
        }
        if !budget.is_positive() {
            return Err(AgoraError::invalid_input("budget", "must be positive"));
        }

        bounded("payment-gateway", self.gateway.collect_deposit(&buyer, budget)).await?;

        let task_id = TaskId::new();
        let escrow = self.escrow.open(task_id.clone(), buyer.clone(), budget);
        let task = Task::new(
            task_id,
            buyer.clone(),
            title,
            budget,
            requirements,
            auction_type,
            escrow.id.clone(),
        );
        self.board.insert(task.clone());

        self.record(
            AuditActor::Buyer { id: buyer },
            AuditAction::TaskFunded {
                task: task.id.clone(),
                escrow: escrow.id.clone(),
                amount: budget,
            },
        )
        .await;
        Ok((task, escrow))
    }

    /// Open the auction window on a funded task
    pub async fn open_auction(
        &self,
        task_id: &TaskId,
        auction_type: AuctionType,
        duration: Duration,
    ) -> Result<Task> {
        if duration <= Duration::zero() {
            return Err(AgoraError::invalid_input(
                "durationMinutes",
                "must be positive",
            ));
        }
        let task = self
            .board
            .open_auction(task_id, auction_type, Utc::now() + duration)?;
        self.record(
            AuditActor::Buyer {
                id: task.buyer.clone(),
            },
            AuditAction::AuctionOpened {
                task: task_id.clone(),
            },
        )
        .await;
        Ok(task)
    }

    /// Submit a bid on behalf of an agent
    pub async fn submit_bid(
        &self,
        task_id: &TaskId,
        agent: &AgentId,
        amount: Amount,
    ) -> Result<Bid> {
        let bid = self.bids.submit(task_id, agent, amount).await?;
        self.record(
            AuditActor::Agent { id: agent.clone() },
            AuditAction::BidPlaced {
                task: task_id.clone(),
                bid: bid.id.clone(),
            },
        )
        .await;
        Ok(bid)
    }

    /// Withdraw an agent's active bid
    pub async fn withdraw_bid(&self, task_id: &TaskId, agent: &AgentId) -> Result<Bid> {
        let bid = self.bids.withdraw(task_id, agent)?;
        self.record(
            AuditActor::Agent { id: agent.clone() },
            AuditAction::BidWithdrawn {
                task: task_id.clone(),
                agent: agent.clone(),
            },
        )
        .await;
        Ok(bid)
    }

    /// Close an auction and run the post-close side effects
    pub async fn close_auction(&self, task_id: &TaskId) -> Result<CloseOutcome> {
        let outcome = self.closer.close(task_id).await?;
        self.after_close(task_id, &outcome).await;
        Ok(outcome)
    }

    /// Close a bounded batch of expired auctions using the configured bound
    pub async fn sweep(&self) -> Vec<SweepResult> {
        self.sweep_with(self.sweep_batch).await
    }

    /// Close a bounded batch of expired auctions
    ///
    /// Per-task failures are recorded in the batch report; side effects run
    /// for the tasks that did close.
    pub async fn sweep_with(&self, limit: usize) -> Vec<SweepResult> {
        let results = self.closer.sweep(limit).await;
        for result in results.iter().filter(|r| r.success) {
            let outcome = match self.assignments.get_by_task(&result.task) {
                Some(assignment) => CloseOutcome::Winner {
                    losers: self
                        .bids
                        .all(&result.task)
                        .into_iter()
                        .filter(|b| b.status == BidStatus::Lost)
                        .map(|b| b.agent)
                        .collect(),
                    assignment,
                },
                None => CloseOutcome::NoBids,
            };
            self.after_close(&result.task, &outcome).await;
        }
        if !results.is_empty() {
            info!(
                closed = results.iter().filter(|r| r.success).count(),
                failed = results.iter().filter(|r| !r.success).count(),
                "sweep pass finished"
            );
        }
        results
    }

    /// The winning agent starts work
    pub async fn start_work(&self, assignment_id: &agora_types::AssignmentId, agent: &AgentId) -> Result<Assignment> {
        let assignment = self.assignments.get(assignment_id)?;
        if assignment.agent != *agent {
            return Err(AgoraError::unauthorized(
                "only the winning agent can start work",
            ));
        }
        self.board
            .transition(&assignment.task, TaskStatus::Assigned, TaskStatus::InProgress)?;
        self.record(
            AuditActor::Agent { id: agent.clone() },
            AuditAction::WorkStarted {
                assignment: assignment_id.clone(),
            },
        )
        .await;
        Ok(assignment)
    }

    /// Release escrowed funds to the winning agent on completion
    pub async fn release(&self, escrow_id: &EscrowId, to: &AgentId) -> Result<Settlement> {
        // Financial commit first; everything after degrades gracefully
        let settlement = self.escrow.release(escrow_id, to)?;

        let escrow = &settlement.escrow;
        if let Err(err) = self.board.transition_from_any(
            &escrow.task,
            &[TaskStatus::Assigned, TaskStatus::InProgress],
            TaskStatus::Completed,
        ) {
            warn!(task = %escrow.task, %err, "could not mark task completed after release");
        }
        if let Some(assignment_id) = &escrow.assignment {
            if let Err(err) = self.assignments.set_status(
                assignment_id,
                agora_types::AssignmentStatus::Active,
                agora_types::AssignmentStatus::Completed,
            ) {
                warn!(assignment = %assignment_id, %err, "could not mark assignment completed");
            }
        }

        self.settle_on_rails(&settlement).await;
        self.record(
            AuditActor::Agent { id: to.clone() },
            AuditAction::EscrowReleased {
                escrow: escrow_id.clone(),
                to: to.clone(),
                amount: escrow.amount,
            },
        )
        .await;
        self.dispatch(Notification::EscrowReleased {
            escrow: escrow_id.clone(),
            agent: to.clone(),
            amount: escrow.amount,
        })
        .await;
        if let Err(err) = bounded(
            "reputation",
            self.reputation.record(
                to,
                ReputationEvent::TaskCompleted {
                    amount: escrow.amount,
                },
            ),
        )
        .await
        {
            warn!(agent = %to, %err, "completion not recorded with reputation service");
        }
        Ok(settlement)
    }

    /// Raise a dispute against an assignment
    pub async fn raise_dispute(
        &self,
        assignment_id: &agora_types::AssignmentId,
        raised_by: Party,
        reason: String,
        evidence: Vec<DisputeEvidence>,
    ) -> Result<Dispute> {
        let dispute = self
            .disputes
            .raise(assignment_id, raised_by, reason, evidence)?;
        self.record(
            AuditActor::System,
            AuditAction::DisputeRaised {
                dispute: dispute.id.clone(),
                assignment: assignment_id.clone(),
            },
        )
        .await;
        self.dispatch(Notification::DisputeRaised {
            assignment: assignment_id.clone(),
            raised_by,
        })
        .await;
        Ok(dispute)
    }

    /// Record a binding resolution; admin surface only
    pub async fn resolve_dispute(
        &self,
        dispute_id: &DisputeId,
        outcome: DisputeOutcome,
    ) -> Result<Resolution> {
        let resolution = self.disputes.resolve(dispute_id, outcome).await?;

        self.settle_on_rails(&resolution.settlement).await;
        self.record(
            AuditActor::System,
            AuditAction::DisputeResolved {
                dispute: dispute_id.clone(),
            },
        )
        .await;
        self.dispatch(Notification::DisputeResolved {
            dispute: dispute_id.clone(),
        })
        .await;
        Ok(resolution)
    }

    /// Current auction snapshot for a task
    pub fn auction_status(&self, task_id: &TaskId) -> Result<AuctionStatus> {
        let task = self.board.get(task_id)?;
        Ok(AuctionStatus {
            active_bids: self.bids.active(task_id).len(),
            assignment: self.assignments.get_by_task(task_id),
            task,
        })
    }

    /// Eligibility reports for the whole candidate pool against a task
    pub async fn eligible_agents(&self, task_id: &TaskId) -> Result<Vec<EligibilityReport>> {
        let task = self.board.get(task_id)?;
        self.eligibility.pool(&task.requirements).await
    }

    /// Revenue counters for an agent
    pub fn revenue(&self, agent: &AgentId) -> RevenueStats {
        self.escrow.revenue(agent)
    }

    /// The escrow ledger view (read paths for the HTTP surface)
    pub fn escrow_snapshot(&self, escrow_id: &EscrowId) -> Result<Escrow> {
        self.escrow.get(escrow_id)
    }

    /// The dispute view
    pub fn dispute_snapshot(&self, dispute_id: &DisputeId) -> Result<Dispute> {
        self.disputes.get(dispute_id)
    }

    // ------------------------------------------------------------------
    // Post-commit side effects
    // ------------------------------------------------------------------

    async fn after_close(&self, task_id: &TaskId, outcome: &CloseOutcome) {
        match outcome {
            CloseOutcome::Winner { assignment, losers } => {
                self.record(
                    AuditActor::System,
                    AuditAction::AuctionClosed {
                        task: task_id.clone(),
                        assignment: assignment.id.clone(),
                        winner: assignment.agent.clone(),
                    },
                )
                .await;
                self.dispatch(Notification::AuctionWon {
                    task: task_id.clone(),
                    agent: assignment.agent.clone(),
                    amount: assignment.amount,
                })
                .await;
                for loser in losers {
                    self.dispatch(Notification::AuctionLost {
                        task: task_id.clone(),
                        agent: loser.clone(),
                    })
                    .await;
                }
                if let Err(err) = bounded(
                    "reputation",
                    self.reputation
                        .record(&assignment.agent, ReputationEvent::AuctionWon),
                )
                .await
                {
                    warn!(agent = %assignment.agent, %err, "auction win not recorded with reputation service");
                }
            }
            CloseOutcome::NoBids => {
                self.record(
                    AuditActor::System,
                    AuditAction::AuctionCancelled {
                        task: task_id.clone(),
                    },
                )
                .await;
                if let Ok(task) = self.board.get(task_id) {
                    self.dispatch(Notification::AuctionCancelled {
                        task: task_id.clone(),
                        buyer: task.buyer,
                    })
                    .await;
                }
            }
        }
    }

    /// Move settled funds on the external rails, best-effort
    async fn settle_on_rails(&self, settlement: &Settlement) {
        if let Some((agent, amount)) = &settlement.to_agent {
            match bounded("payment-gateway", self.gateway.pay_out(agent, *amount)).await {
                Ok(()) => {
                    let _ = self.escrow.mark_settled_externally(&settlement.escrow.id);
                }
                Err(err) => {
                    warn!(agent = %agent, %err, "payout deferred, ledger remains authoritative")
                }
            }
        }
        if let Some((buyer, amount)) = &settlement.to_buyer {
            if let Err(err) = bounded(
                "payment-gateway",
                self.gateway.return_deposit(buyer, *amount),
            )
            .await
            {
                warn!(buyer = %buyer, %err, "refund transfer deferred, ledger remains authoritative");
            }
        }
    }

    async fn record(&self, actor: AuditActor, action: AuditAction) {
        if let Err(err) = bounded("audit", self.audit.record(actor, action)).await {
            warn!(%err, "audit entry not recorded");
        }
    }

    async fn dispatch(&self, notification: Notification) {
        if let Err(err) = bounded("notifications", self.notifier.dispatch(notification)).await {
            warn!(%err, "notification delivery deferred");
        }
    }
}

/// Handles to the in-memory collaborators behind a wired brokerage
pub struct InMemoryWiring {
    pub directory: Arc<InMemoryDirectory>,
    pub reputation: Arc<InMemoryReputation>,
    pub notifier: Arc<RecordingDispatcher>,
    pub gateway: Arc<InMemoryGateway>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl Brokerage {
    /// A brokerage wired entirely to in-memory collaborators
    pub fn in_memory(platform: &str) -> (Arc<Brokerage>, InMemoryWiring) {
        let registry = Arc::new(DirectoryRegistry::new());
        let directory = Arc::new(InMemoryDirectory::new(platform));
        registry.register(directory.clone());
        let reputation = Arc::new(InMemoryReputation::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let gateway = Arc::new(InMemoryGateway::new());
        let audit = Arc::new(InMemoryAuditLog::new());

        let brokerage = Arc::new(Brokerage::new(Collaborators {
            directory: registry,
            reputation: reputation.clone(),
            notifier: notifier.clone(),
            gateway: gateway.clone(),
            audit: audit.clone(),
        }));
        (
            brokerage,
            InMemoryWiring {
                directory,
                reputation,
                notifier,
                gateway,
                audit,
            },
        )
    }
}
