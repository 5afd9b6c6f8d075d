//! Append-only audit log
//!
//! Every state transition in the marketplace produces an audit entry. The
//! log is hash-chained: each entry commits to its predecessor, so tampering
//! with history is detectable.

use agora_types::{
    AgentId, Amount, AssignmentId, AuditEntryId, BidId, BuyerId, DisputeId, EscrowId, Result,
    TaskId, TemporalAnchor,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Who performed an audited action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditActor {
    Buyer { id: BuyerId },
    Agent { id: AgentId },
    /// The sweep job or another internal process
    System,
}

/// Auditable marketplace actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditAction {
    TaskFunded { task: TaskId, escrow: EscrowId, amount: Amount },
    AuctionOpened { task: TaskId },
    BidPlaced { task: TaskId, bid: BidId },
    BidWithdrawn { task: TaskId, agent: AgentId },
    AuctionClosed { task: TaskId, assignment: AssignmentId, winner: AgentId },
    AuctionCancelled { task: TaskId },
    WorkStarted { assignment: AssignmentId },
    EscrowReleased { escrow: EscrowId, to: AgentId, amount: Amount },
    EscrowRefunded { escrow: EscrowId, to: BuyerId, amount: Amount },
    EscrowDisputed { escrow: EscrowId },
    DisputeRaised { dispute: DisputeId, assignment: AssignmentId },
    DisputeResolved { dispute: DisputeId },
}

/// A hash-chained audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry ID
    pub id: AuditEntryId,
    /// Hash of the previous entry
    pub previous_hash: String,
    /// Hash of this entry
    pub hash: String,
    /// When the entry was recorded
    pub recorded_at: TemporalAnchor,
    /// Who acted
    pub actor: AuditActor,
    /// What happened
    pub action: AuditAction,
}

impl AuditEntry {
    /// Compute the hash of this entry
    pub fn compute_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let content = format!(
            "{}:{}:{:?}:{:?}",
            self.previous_hash, self.recorded_at.timestamp, self.actor, self.action
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify the entry hash
    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Audit log interface
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an entry for an action
    async fn record(&self, actor: AuditActor, action: AuditAction) -> Result<AuditEntryId>;

    /// Verify the whole chain
    async fn verify_chain(&self) -> Result<bool>;

    /// Export all entries
    async fn export(&self) -> Result<Vec<AuditEntry>>;
}

/// In-memory hash-chained audit log
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries recorded
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, actor: AuditActor, action: AuditAction) -> Result<AuditEntryId> {
        let mut entries = self.entries.lock();
        let previous_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| "genesis".to_string());

        let mut entry = AuditEntry {
            id: AuditEntryId::new(),
            previous_hash,
            hash: String::new(),
            recorded_at: TemporalAnchor::now(),
            actor,
            action,
        };
        entry.hash = entry.compute_hash();

        let id = entry.id.clone();
        entries.push(entry);
        Ok(id)
    }

    async fn verify_chain(&self) -> Result<bool> {
        let entries = self.entries.lock();
        let mut previous = "genesis".to_string();
        for entry in entries.iter() {
            if entry.previous_hash != previous || !entry.verify() {
                return Ok(false);
            }
            previous = entry.hash.clone();
        }
        Ok(true)
    }

    async fn export(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.lock().clone())
    }
}
