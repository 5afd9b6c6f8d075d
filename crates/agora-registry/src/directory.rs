//! Agent directory lookup
//!
//! Agents register on different platforms (hosted runtimes, self-operated
//! nodes, partner networks). Each platform exposes the same narrow lookup
//! interface; the [`DirectoryRegistry`] selects the backend by platform
//! identifier rather than modeling platforms as a type hierarchy.

use agora_types::{AgentId, AgoraError, DataClass, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a platform knows about a registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// The agent
    pub agent: AgentId,
    /// Platform the agent registered through
    pub platform: String,
    /// Skills the agent advertises
    pub skills: Vec<String>,
    /// Regions the agent operates in
    pub regions: Vec<String>,
    /// Highest data class the agent is cleared for
    pub cleared_data_class: DataClass,
    /// Whether the agent is currently accepting work
    pub active: bool,
}

/// Lookup interface implemented once per platform variant
#[async_trait::async_trait]
pub trait PlatformDirectory: Send + Sync {
    /// Platform identifier this backend serves
    fn platform(&self) -> &str;

    /// Fetch a single agent's profile
    async fn profile(&self, agent: &AgentId) -> Result<Option<AgentProfile>>;

    /// List all active agents on this platform
    async fn agents(&self) -> Result<Vec<AgentProfile>>;
}

/// Registry of platform backends, keyed on platform identifier
#[derive(Default)]
pub struct DirectoryRegistry {
    backends: DashMap<String, Arc<dyn PlatformDirectory>>,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
        }
    }

    /// Register a platform backend
    pub fn register(&self, backend: Arc<dyn PlatformDirectory>) {
        self.backends.insert(backend.platform().to_string(), backend);
    }

    /// Look up an agent across all registered platforms
    pub async fn profile(&self, agent: &AgentId) -> Result<AgentProfile> {
        let backends: Vec<Arc<dyn PlatformDirectory>> =
            self.backends.iter().map(|e| e.value().clone()).collect();
        for backend in backends {
            if let Some(profile) = backend.profile(agent).await? {
                return Ok(profile);
            }
        }
        Err(AgoraError::AgentUnknown {
            agent_id: agent.to_string(),
        })
    }

    /// The full candidate pool across all platforms
    pub async fn candidates(&self) -> Result<Vec<AgentProfile>> {
        let backends: Vec<Arc<dyn PlatformDirectory>> =
            self.backends.iter().map(|e| e.value().clone()).collect();
        let mut pool = Vec::new();
        for backend in backends {
            pool.extend(backend.agents().await?);
        }
        Ok(pool)
    }
}

/// In-memory platform backend
pub struct InMemoryDirectory {
    platform: String,
    profiles: DashMap<AgentId, AgentProfile>,
}

impl InMemoryDirectory {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            profiles: DashMap::new(),
        }
    }

    /// Register an agent on this platform
    pub fn enroll(&self, mut profile: AgentProfile) {
        profile.platform = self.platform.clone();
        self.profiles.insert(profile.agent.clone(), profile);
    }
}

#[async_trait::async_trait]
impl PlatformDirectory for InMemoryDirectory {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn profile(&self, agent: &AgentId) -> Result<Option<AgentProfile>> {
        Ok(self.profiles.get(agent).map(|p| p.clone()))
    }

    async fn agents(&self) -> Result<Vec<AgentProfile>> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| p.active)
            .map(|p| p.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile(agent: AgentId) -> AgentProfile {
        AgentProfile {
            agent,
            platform: String::new(),
            skills: vec!["translation".to_string()],
            regions: vec!["eu".to_string()],
            cleared_data_class: DataClass::Internal,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_registry_finds_agent_across_platforms() {
        let registry = DirectoryRegistry::new();
        let hosted = Arc::new(InMemoryDirectory::new("hosted"));
        let partner = Arc::new(InMemoryDirectory::new("partner"));

        let agent = AgentId::new();
        partner.enroll(test_profile(agent.clone()));

        registry.register(hosted);
        registry.register(partner);

        let profile = registry.profile(&agent).await.unwrap();
        assert_eq!(profile.platform, "partner");
    }

    #[tokio::test]
    async fn test_unknown_agent_is_an_error() {
        let registry = DirectoryRegistry::new();
        registry.register(Arc::new(InMemoryDirectory::new("hosted")));

        let result = registry.profile(&AgentId::new()).await;
        assert!(matches!(result, Err(AgoraError::AgentUnknown { .. })));
    }

    #[tokio::test]
    async fn test_candidates_skip_inactive_agents() {
        let hosted = InMemoryDirectory::new("hosted");
        let mut inactive = test_profile(AgentId::new());
        inactive.active = false;
        hosted.enroll(inactive);
        hosted.enroll(test_profile(AgentId::new()));

        let registry = DirectoryRegistry::new();
        registry.register(Arc::new(hosted));

        assert_eq!(registry.candidates().await.unwrap().len(), 1);
    }
}
