//! Agent identity and the capability traits the tournament consumes.
//!
//! The core never talks to an inference backend directly. A contestant is anything
//! implementing [`AgentCapability`]; the judge is anything implementing
//! [`JudgingCapability`]. Concrete LLM-backed implementations live in `arena-agents`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inference tier an agent's model is served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Local inference server (e.g. Ollama).
    #[default]
    Local,
    /// Higher-tier cloud model, typically reserved for the judge.
    Cloud,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Static description of an agent, fixed for the lifetime of a tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique name within a tournament.
    pub name: String,
    /// Free-text persona label (e.g. "Speed Freak").
    pub role: String,
    /// Model identifier passed to the inference backend.
    pub model: String,
    /// System prompt, loaded once.
    pub personality: String,
    /// Which backend tier serves `model`.
    #[serde(default)]
    pub tier: ModelTier,
}

impl AgentProfile {
    pub fn new(name: &str, role: &str, model: &str, personality: &str) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            model: model.to_string(),
            personality: personality.to_string(),
            tier: ModelTier::Local,
        }
    }

    /// Route this agent to the given tier.
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }
}

/// Failure of an external capability call.
///
/// The orchestrator never propagates these: they turn into an unsuccessful
/// submission or a fallback verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned an error: {0}")]
    Backend(String),

    #[error("empty response from backend")]
    EmptyResponse,

    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// A contestant: produces candidate source for a problem and refines it.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Stable agent name, unique within a tournament.
    fn name(&self) -> &str;

    /// Produce a first candidate for `problem`.
    async fn generate(&self, problem: &str) -> Result<String, CapabilityError>;

    /// Produce an improved candidate given the agent's own prior code, the
    /// leader's code and the combined critique.
    async fn refine(
        &self,
        problem: &str,
        own_prior_code: &str,
        reference_code: &str,
        critique: &str,
    ) -> Result<String, CapabilityError>;
}

/// The adjudicator: answers an evidence document with free text that is expected
/// to contain one JSON object.
#[async_trait]
pub trait JudgingCapability: Send + Sync {
    async fn ask(&self, evidence: &str) -> Result<String, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_to_local_tier() {
        let profile = AgentProfile::new("Turbo_Tim", "Speed Freak", "llama3.1", "Go fast.");
        assert_eq!(profile.tier, ModelTier::Local);
        assert_eq!(profile.with_tier(ModelTier::Cloud).tier, ModelTier::Cloud);
    }

    #[test]
    fn test_tier_deserializes_snake_case() {
        let tier: ModelTier = serde_json::from_str("\"cloud\"").unwrap();
        assert_eq!(tier, ModelTier::Cloud);
        assert_eq!(tier.to_string(), "cloud");
    }

    #[test]
    fn test_capability_error_display() {
        assert_eq!(CapabilityError::Timeout(30).to_string(), "timed out after 30s");
        assert_eq!(
            CapabilityError::EmptyResponse.to_string(),
            "empty response from backend"
        );
    }
}
