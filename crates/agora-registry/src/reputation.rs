//! Reputation and stake lookup
//!
//! The trust score and posted stake live in an external reputation service.
//! The core only reads them (eligibility, tie-breaks) and reports outcome
//! events back after settlements and dispute resolutions.

use agora_types::{AgentId, Amount, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Trust snapshot for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReport {
    /// Trust score, 0-100
    pub score: f64,
    /// Stake the agent has posted
    pub stake: Amount,
}

/// Outcome events that feed back into reputation scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReputationEvent {
    /// The agent won an auction
    AuctionWon,
    /// The agent completed a task and was paid
    TaskCompleted { amount: Amount },
    /// A dispute resolved in the agent's favor
    DisputeUpheld,
    /// A dispute resolved against the agent
    DisputeRejected,
}

/// Reputation service interface
#[async_trait::async_trait]
pub trait ReputationOracle: Send + Sync {
    /// Fetch the trust report for an agent; `None` means the agent is
    /// unknown to the service
    async fn trust(&self, agent: &AgentId) -> Result<Option<TrustReport>>;

    /// Report an outcome event for scoring
    async fn record(&self, agent: &AgentId, event: ReputationEvent) -> Result<()>;
}

/// In-memory reputation service
#[derive(Default)]
pub struct InMemoryReputation {
    reports: DashMap<AgentId, TrustReport>,
    events: DashMap<AgentId, Vec<ReputationEvent>>,
}

impl InMemoryReputation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a trust report
    pub fn set(&self, agent: AgentId, report: TrustReport) {
        self.reports.insert(agent, report);
    }

    /// Events recorded for an agent
    pub fn events_for(&self, agent: &AgentId) -> Vec<ReputationEvent> {
        self.events.get(agent).map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ReputationOracle for InMemoryReputation {
    async fn trust(&self, agent: &AgentId) -> Result<Option<TrustReport>> {
        Ok(self.reports.get(agent).map(|r| r.clone()))
    }

    async fn record(&self, agent: &AgentId, event: ReputationEvent) -> Result<()> {
        self.events.entry(agent.clone()).or_default().push(event);
        Ok(())
    }
}
