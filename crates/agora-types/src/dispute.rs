//! Dispute types for Agora

use crate::{Amount, AssignmentId, DisputeId, Party, TemporalAnchor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// Awaiting a binding resolution
    Open,
    /// Resolved; the outcome is final
    Resolved,
}

/// The binding outcome of a dispute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// Held funds go to the agent
    Release,
    /// Held funds return to the buyer
    Refund,
    /// Held funds are divided; the named amount goes to the agent,
    /// the remainder to the buyer
    Split { to_agent: Amount },
}

/// A piece of evidence attached to a dispute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeEvidence {
    /// Which party submitted it
    pub submitted_by: Party,
    /// Free-form label (e.g. "delivery_log", "chat_transcript")
    pub label: String,
    /// Content or a reference to it
    pub content: String,
    /// When it was submitted
    pub submitted_at: TemporalAnchor,
}

/// A formal contest over an assignment's outcome
///
/// At most one open dispute exists per assignment; raising one freezes the
/// escrow until resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique dispute ID
    pub id: DisputeId,
    /// The contested assignment
    pub assignment: AssignmentId,
    /// Which party raised it
    pub raised_by: Party,
    /// Why it was raised
    pub reason: String,
    /// Evidence gathered so far
    pub evidence: Vec<DisputeEvidence>,
    /// Current status
    pub status: DisputeStatus,
    /// The binding outcome, once resolved
    pub outcome: Option<DisputeOutcome>,
    /// When the dispute was raised
    pub raised_at: DateTime<Utc>,
    /// When the dispute was resolved
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Create a new open dispute
    pub fn new(
        assignment: AssignmentId,
        raised_by: Party,
        reason: String,
        evidence: Vec<DisputeEvidence>,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            assignment,
            raised_by,
            reason,
            evidence,
            status: DisputeStatus::Open,
            outcome: None,
            raised_at: Utc::now(),
            resolved_at: None,
        }
    }
}
