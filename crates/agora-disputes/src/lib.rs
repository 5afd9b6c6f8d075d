//! Agora Disputes - Contesting an assignment's outcome
//!
//! Raising a dispute freezes the escrow; resolving one moves the funds per
//! the outcome and is terminal. The open-dispute index insert is atomic per
//! assignment, so two parties contesting simultaneously produce exactly one
//! dispute. Resolution order matters: the dispute record is claimed first
//! (the exactly-once gate), then the escrow moves. By the time a resolver
//! holds the claim, the escrow is guaranteed frozen and cannot escape.

use agora_board::{AssignmentBook, TaskBoard};
use agora_escrow::{EscrowLedger, Settlement};
use agora_registry::{bounded, ReputationEvent, ReputationOracle};
use agora_types::{
    AgoraError, AssignmentId, AssignmentStatus, Dispute, DisputeEvidence, DisputeId,
    DisputeOutcome, DisputeStatus, Party, Result, TaskStatus,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a resolution, for the orchestrator's side effects
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The resolved dispute
    pub dispute: Dispute,
    /// The escrow settlement the outcome produced
    pub settlement: Settlement,
}

/// The dispute resolver
pub struct DisputeResolver {
    disputes: DashMap<DisputeId, Dispute>,
    open_by_assignment: DashMap<AssignmentId, DisputeId>,
    board: Arc<TaskBoard>,
    assignments: Arc<AssignmentBook>,
    escrow: Arc<EscrowLedger>,
    reputation: Arc<dyn ReputationOracle>,
}

impl DisputeResolver {
    pub fn new(
        board: Arc<TaskBoard>,
        assignments: Arc<AssignmentBook>,
        escrow: Arc<EscrowLedger>,
        reputation: Arc<dyn ReputationOracle>,
    ) -> Self {
        Self {
            disputes: DashMap::new(),
            open_by_assignment: DashMap::new(),
            board,
            assignments,
            escrow,
            reputation,
        }
    }

    /// Raise a dispute against an assignment
    ///
    /// Fails if an open dispute already exists; on success the escrow is
    /// frozen and the task marked disputed.
    pub fn raise(
        &self,
        assignment_id: &AssignmentId,
        raised_by: Party,
        reason: String,
        evidence: Vec<DisputeEvidence>,
    ) -> Result<Dispute> {
        let assignment = self.assignments.get(assignment_id)?;
        let task = self.board.get(&assignment.task)?;

        let dispute = Dispute::new(assignment_id.clone(), raised_by, reason, evidence);

        // Atomic uniqueness gate: one open dispute per assignment
        match self.open_by_assignment.entry(assignment_id.clone()) {
            Entry::Occupied(_) => {
                return Err(AgoraError::DisputeAlreadyOpen {
                    assignment_id: assignment_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(dispute.id.clone());
            }
        }

        // Freeze the escrow; if it cannot be frozen the gate is rolled back
        if let Err(err) = self.escrow.mark_disputed(&task.escrow) {
            self.open_by_assignment.remove(assignment_id);
            return Err(err);
        }

        // Task status follows; a failure here is not a financial problem
        if let Err(err) = self.board.transition_from_any(
            &assignment.task,
            &[
                TaskStatus::Assigned,
                TaskStatus::InProgress,
                TaskStatus::Completed,
            ],
            TaskStatus::Disputed,
        ) {
            warn!(task = %assignment.task, %err, "could not mark task disputed");
        }

        info!(dispute = %dispute.id, assignment = %assignment_id, %raised_by, "dispute raised");
        self.disputes.insert(dispute.id.clone(), dispute.clone());
        Ok(dispute)
    }

    /// Attach evidence to an open dispute
    pub fn submit_evidence(
        &self,
        dispute_id: &DisputeId,
        evidence: DisputeEvidence,
    ) -> Result<Dispute> {
        let mut entry = self.disputes.get_mut(dispute_id).ok_or_else(|| {
            AgoraError::DisputeNotFound {
                dispute_id: dispute_id.to_string(),
            }
        })?;
        if entry.status != DisputeStatus::Open {
            return Err(AgoraError::DisputeAlreadyResolved {
                dispute_id: dispute_id.to_string(),
            });
        }
        entry.evidence.push(evidence);
        Ok(entry.clone())
    }

    /// Record a binding resolution and settle the escrow accordingly
    ///
    /// Terminal: repeated calls fail with `DisputeAlreadyResolved`.
    pub async fn resolve(&self, dispute_id: &DisputeId, outcome: DisputeOutcome) -> Result<Resolution> {
        let assignment_id = self.get(dispute_id)?.assignment;
        let assignment = self.assignments.get(&assignment_id)?;
        let task = self.board.get(&assignment.task)?;

        // Claim the dispute under its entry lock: the exactly-once gate
        let dispute = {
            let mut entry = self.disputes.get_mut(dispute_id).ok_or_else(|| {
                AgoraError::DisputeNotFound {
                    dispute_id: dispute_id.to_string(),
                }
            })?;
            if entry.status != DisputeStatus::Open {
                return Err(AgoraError::DisputeAlreadyResolved {
                    dispute_id: dispute_id.to_string(),
                });
            }
            entry.status = DisputeStatus::Resolved;
            entry.outcome = Some(outcome.clone());
            entry.resolved_at = Some(Utc::now());
            entry.clone()
        };

        let settlement = match &outcome {
            DisputeOutcome::Release => self.escrow.resolve_release(&task.escrow),
            DisputeOutcome::Refund => self.escrow.resolve_refund(&task.escrow),
            DisputeOutcome::Split { to_agent } => {
                self.escrow.resolve_split(&task.escrow, *to_agent)
            }
        };
        let settlement = match settlement {
            Ok(s) => s,
            Err(err) => {
                // Reopen the claim so the outcome can be corrected and retried
                if let Some(mut entry) = self.disputes.get_mut(dispute_id) {
                    entry.status = DisputeStatus::Open;
                    entry.outcome = None;
                    entry.resolved_at = None;
                }
                return Err(err);
            }
        };

        self.open_by_assignment.remove(&assignment_id);

        // Task and assignment leave the disputed state per the outcome
        let (next_task, next_assignment) = match &outcome {
            DisputeOutcome::Refund => (TaskStatus::Cancelled, AssignmentStatus::Cancelled),
            _ => (TaskStatus::Completed, AssignmentStatus::Completed),
        };
        if let Err(err) =
            self.board
                .transition_from_any(&assignment.task, &[TaskStatus::Disputed], next_task)
        {
            warn!(task = %assignment.task, %err, "could not settle task status after resolution");
        }
        if let Err(err) =
            self.assignments
                .set_status(&assignment_id, AssignmentStatus::Active, next_assignment)
        {
            warn!(assignment = %assignment_id, %err, "could not settle assignment status after resolution");
        }

        // Reputation impact is best-effort after the financial commit
        let event = match &outcome {
            DisputeOutcome::Release => ReputationEvent::DisputeUpheld,
            _ => ReputationEvent::DisputeRejected,
        };
        if let Err(err) = bounded("reputation", self.reputation.record(&assignment.agent, event)).await
        {
            warn!(agent = %assignment.agent, %err, "reputation impact not recorded, queued for retry");
        }

        info!(dispute = %dispute_id, assignment = %assignment_id, "dispute resolved");
        Ok(Resolution {
            dispute,
            settlement,
        })
    }

    /// Fetch a dispute snapshot
    pub fn get(&self, dispute_id: &DisputeId) -> Result<Dispute> {
        self.disputes
            .get(dispute_id)
            .map(|d| d.clone())
            .ok_or_else(|| AgoraError::DisputeNotFound {
                dispute_id: dispute_id.to_string(),
            })
    }

    /// The open dispute for an assignment, if any
    pub fn open_for(&self, assignment_id: &AssignmentId) -> Option<Dispute> {
        let id = self.open_by_assignment.get(assignment_id)?.clone();
        self.disputes.get(&id).map(|d| d.clone())
    }
}
