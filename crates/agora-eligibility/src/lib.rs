//! Agora Eligibility - Which agents may bid on a task
//!
//! The filter itself is a pure function of a task's requirements, an agent's
//! directory profile, and an optional trust report. The surrounding service
//! gathers those inputs from collaborators with bounded timeouts and treats
//! unknown trust as ineligible. When the reputation service is down, nobody
//! new gets in.

use agora_registry::{bounded, AgentProfile, DirectoryRegistry, ReputationOracle, TrustReport};
use agora_types::{AgentId, Result, TaskRequirements};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Individual checks an agent must pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityCheck {
    /// Task skills must be a subset of the agent's skills
    Skills,
    /// Agent must be cleared for the task's data class
    DataClass,
    /// Agent must operate in the task's region
    Region,
    /// Trust score must meet the task minimum
    TrustScore,
    /// Posted stake must meet the task minimum
    Stake,
}

/// Per-agent eligibility verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityReport {
    /// The agent evaluated
    pub agent: AgentId,
    /// Overall verdict
    pub eligible: bool,
    /// Checks that failed (empty when eligible)
    pub failed: Vec<EligibilityCheck>,
}

/// Evaluate a single agent against a task's requirements
///
/// Pure function: no side effects, no lookups. A missing trust report fails
/// both the trust and stake checks.
pub fn evaluate(
    requirements: &TaskRequirements,
    profile: &AgentProfile,
    trust: Option<&TrustReport>,
) -> EligibilityReport {
    let mut failed = Vec::new();

    let covers_skills = requirements
        .skills
        .iter()
        .all(|skill| profile.skills.iter().any(|s| s == skill));
    if !covers_skills {
        failed.push(EligibilityCheck::Skills);
    }

    if profile.cleared_data_class < requirements.data_class {
        failed.push(EligibilityCheck::DataClass);
    }

    let in_region = requirements.region == "global"
        || profile.regions.iter().any(|r| r == &requirements.region);
    if !in_region {
        failed.push(EligibilityCheck::Region);
    }

    match trust {
        Some(report) => {
            if report.score < requirements.min_trust_score {
                failed.push(EligibilityCheck::TrustScore);
            }
            let stake_ok = report
                .stake
                .compare(&requirements.min_stake)
                .map(|ord| ord != std::cmp::Ordering::Less)
                .unwrap_or(false);
            if !stake_ok && requirements.min_stake.is_positive() {
                failed.push(EligibilityCheck::Stake);
            }
        }
        None => {
            if requirements.min_trust_score > 0.0 {
                failed.push(EligibilityCheck::TrustScore);
            }
            if requirements.min_stake.is_positive() {
                failed.push(EligibilityCheck::Stake);
            }
        }
    }

    EligibilityReport {
        agent: profile.agent.clone(),
        eligible: failed.is_empty(),
        failed,
    }
}

/// Gathers collaborator inputs and runs the filter
pub struct EligibilityService {
    directory: Arc<DirectoryRegistry>,
    reputation: Arc<dyn ReputationOracle>,
}

impl EligibilityService {
    pub fn new(directory: Arc<DirectoryRegistry>, reputation: Arc<dyn ReputationOracle>) -> Self {
        Self {
            directory,
            reputation,
        }
    }

    /// Evaluate one agent; unknown agents and unreachable collaborators
    /// yield an ineligible verdict rather than an error
    pub async fn check(&self, requirements: &TaskRequirements, agent: &AgentId) -> Result<EligibilityReport> {
        let profile = self.directory.profile(agent).await?;
        Ok(evaluate(requirements, &profile, self.trust_of(agent).await.as_ref()))
    }

    /// Evaluate the whole candidate pool
    pub async fn pool(&self, requirements: &TaskRequirements) -> Result<Vec<EligibilityReport>> {
        let candidates = self.directory.candidates().await?;
        let mut reports = Vec::with_capacity(candidates.len());
        for profile in &candidates {
            let trust = self.trust_of(&profile.agent).await;
            reports.push(evaluate(requirements, profile, trust.as_ref()));
        }
        Ok(reports)
    }

    /// Trust score used for auction tie-breaks; unknown agents score zero
    pub async fn tie_break_score(&self, agent: &AgentId) -> f64 {
        self.trust_of(agent).await.map(|t| t.score).unwrap_or(0.0)
    }

    async fn trust_of(&self, agent: &AgentId) -> Option<TrustReport> {
        match bounded("reputation", self.reputation.trust(agent)).await {
            Ok(report) => report,
            Err(err) => {
                warn!(%agent, %err, "reputation lookup failed, treating as unknown");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_registry::InMemoryDirectory;
    use agora_types::{AgoraError, Amount, Currency, DataClass};

    fn requirements() -> TaskRequirements {
        TaskRequirements {
            skills: vec!["translation".to_string()],
            data_class: DataClass::Internal,
            region: "eu".to_string(),
            min_trust_score: 60.0,
            min_stake: Amount::credits(100.0),
        }
    }

    fn profile(agent: AgentId) -> AgentProfile {
        AgentProfile {
            agent,
            platform: "hosted".to_string(),
            skills: vec!["translation".to_string(), "summarization".to_string()],
            regions: vec!["eu".to_string()],
            cleared_data_class: DataClass::Confidential,
            active: true,
        }
    }

    fn good_trust() -> TrustReport {
        TrustReport {
            score: 75.0,
            stake: Amount::credits(500.0),
        }
    }

    #[test]
    fn test_fully_qualified_agent_passes() {
        let report = evaluate(&requirements(), &profile(AgentId::new()), Some(&good_trust()));
        assert!(report.eligible);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_missing_skill_fails() {
        let mut req = requirements();
        req.skills.push("code_review".to_string());
        let report = evaluate(&req, &profile(AgentId::new()), Some(&good_trust()));
        assert!(!report.eligible);
        assert_eq!(report.failed, vec![EligibilityCheck::Skills]);
    }

    #[test]
    fn test_data_class_clearance_is_ordered() {
        let mut p = profile(AgentId::new());
        p.cleared_data_class = DataClass::Public;
        let report = evaluate(&requirements(), &p, Some(&good_trust()));
        assert!(report.failed.contains(&EligibilityCheck::DataClass));
    }

    #[test]
    fn test_wrong_region_fails() {
        let mut p = profile(AgentId::new());
        p.regions = vec!["us".to_string()];
        let report = evaluate(&requirements(), &p, Some(&good_trust()));
        assert!(report.failed.contains(&EligibilityCheck::Region));
    }

    #[test]
    fn test_global_region_accepts_anyone() {
        let mut req = requirements();
        req.region = "global".to_string();
        let mut p = profile(AgentId::new());
        p.regions = vec!["apac".to_string()];
        let report = evaluate(&req, &p, Some(&good_trust()));
        assert!(!report.failed.contains(&EligibilityCheck::Region));
    }

    #[test]
    fn test_unknown_trust_fails_closed() {
        let report = evaluate(&requirements(), &profile(AgentId::new()), None);
        assert!(!report.eligible);
        assert!(report.failed.contains(&EligibilityCheck::TrustScore));
        assert!(report.failed.contains(&EligibilityCheck::Stake));
    }

    #[test]
    fn test_low_stake_fails() {
        let trust = TrustReport {
            score: 90.0,
            stake: Amount::credits(10.0),
        };
        let report = evaluate(&requirements(), &profile(AgentId::new()), Some(&trust));
        assert_eq!(report.failed, vec![EligibilityCheck::Stake]);
    }

    struct DownOracle;

    #[async_trait::async_trait]
    impl ReputationOracle for DownOracle {
        async fn trust(&self, _agent: &AgentId) -> Result<Option<TrustReport>> {
            Err(AgoraError::ExternalUnavailable {
                service: "reputation".to_string(),
            })
        }

        async fn record(
            &self,
            _agent: &AgentId,
            _event: agora_registry::ReputationEvent,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_service_fails_closed_when_oracle_is_down() {
        let directory = Arc::new(DirectoryRegistry::new());
        let hosted = InMemoryDirectory::new("hosted");
        let agent = AgentId::new();
        hosted.enroll(profile(agent.clone()));
        directory.register(Arc::new(hosted));

        let service = EligibilityService::new(directory, Arc::new(DownOracle));
        let report = service.check(&requirements(), &agent).await.unwrap();
        assert!(!report.eligible);

        // Tie-break scoring degrades to zero rather than erroring
        assert_eq!(service.tie_break_score(&agent).await, 0.0);
    }

    #[tokio::test]
    async fn test_pool_reports_every_candidate() {
        let directory = Arc::new(DirectoryRegistry::new());
        let hosted = InMemoryDirectory::new("hosted");
        let strong = AgentId::new();
        let weak = AgentId::new();
        hosted.enroll(profile(strong.clone()));
        let mut weak_profile = profile(weak.clone());
        weak_profile.skills = vec!["summarization".to_string()];
        hosted.enroll(weak_profile);
        directory.register(Arc::new(hosted));

        let reputation = Arc::new(agora_registry::InMemoryReputation::new());
        reputation.set(strong.clone(), good_trust());
        reputation.set(weak.clone(), good_trust());

        let service = EligibilityService::new(directory, reputation);
        let reports = service.pool(&requirements()).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports.iter().filter(|r| r.eligible).count(), 1);
    }
}
