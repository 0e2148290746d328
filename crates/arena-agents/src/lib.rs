//! Code Arena agents: inference backends, roster configuration and wiring.
//!
//! The `arena` crate only knows the capability traits. This crate supplies the
//! LLM-backed implementations and builds a ready-to-run [`arena::Tournament`]
//! from a roster file.

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod config;
pub mod llm;
pub mod prompts;

use std::sync::Arc;

use anyhow::{Context, Result};
use arena::{
    AgentCapability, AgentProfile, CapabilityError, JudgingCapability, JsonFileRecordSink,
    ModelTier, RatingStore, Tournament,
};
use tracing::{info, warn};

pub use agents::{extract_code, LlmAgent, LlmJudge};
pub use config::{ArenaConfig, ConfigError, Endpoints};
pub use llm::ChatClient;

/// Chat clients per tier, shared by every agent routed to them.
#[derive(Debug, Clone)]
pub struct Backends {
    local: ChatClient,
    cloud: Option<ChatClient>,
}

impl Backends {
    pub fn from_endpoints(endpoints: &Endpoints) -> Result<Self, CapabilityError> {
        let local = ChatClient::new(&endpoints.local.url, &endpoints.local.api_key)?;
        let cloud = match &endpoints.cloud {
            Some(cloud) => Some(ChatClient::new(&cloud.url, &cloud.api_key)?.with_temperature(0.2)),
            None => None,
        };
        Ok(Self { local, cloud })
    }

    pub fn local(&self) -> &ChatClient {
        &self.local
    }

    pub fn has_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    /// Probe every configured endpoint, warning about any that does not answer.
    pub async fn preflight(&self) -> Vec<(ModelTier, bool)> {
        let mut status = vec![(ModelTier::Local, self.local.is_reachable().await)];
        if let Some(cloud) = &self.cloud {
            status.push((ModelTier::Cloud, cloud.is_reachable().await));
        }
        for (tier, reachable) in &status {
            if !reachable {
                warn!(?tier, "inference endpoint unreachable, its agents will fail to generate");
            }
        }
        status
    }

    /// Contestants in roster order. Cloud-tier agents fall back to the local
    /// endpoint when no cloud endpoint is configured.
    pub fn contestants(&self, profiles: &[AgentProfile]) -> Vec<Arc<dyn AgentCapability>> {
        profiles
            .iter()
            .map(|profile| {
                let client = match (profile.tier, &self.cloud) {
                    (ModelTier::Cloud, Some(cloud)) => cloud.clone(),
                    (ModelTier::Cloud, None) => {
                        warn!(agent = %profile.name, "no cloud endpoint configured, using local");
                        self.local.clone()
                    }
                    (ModelTier::Local, _) => self.local.clone(),
                };
                Arc::new(LlmAgent::new(profile.clone(), client)) as Arc<dyn AgentCapability>
            })
            .collect()
    }

    /// The judge. A cloud-tier judge without a cloud endpoint runs locally on
    /// `local_model`, since its cloud model name would not exist there.
    pub fn judge(&self, profile: &AgentProfile, local_model: &str) -> Arc<dyn JudgingCapability> {
        match (profile.tier, &self.cloud) {
            (ModelTier::Cloud, Some(cloud)) => {
                Arc::new(LlmJudge::new(profile.clone(), cloud.clone()))
            }
            (ModelTier::Cloud, None) => {
                warn!(
                    judge = %profile.name,
                    model = %local_model,
                    "no cloud endpoint configured, judging on the local tier"
                );
                let local = AgentProfile {
                    model: local_model.to_string(),
                    tier: ModelTier::Local,
                    ..profile.clone()
                };
                Arc::new(LlmJudge::new(local, self.local.clone()))
            }
            (ModelTier::Local, _) => Arc::new(LlmJudge::new(profile.clone(), self.local.clone())),
        }
    }
}

/// Build a tournament from a loaded configuration: LLM contestants and judge,
/// file-backed ratings and records under `output_dir`.
pub fn build_tournament(config: &ArenaConfig, endpoints: &Endpoints) -> Result<Tournament> {
    let backends = Backends::from_endpoints(endpoints).context("failed to build chat clients")?;
    let contestants = backends.contestants(&config.agents);
    let local_model = config
        .agents
        .first()
        .map(|a| a.model.as_str())
        .unwrap_or_default();
    let judge = backends.judge(&config.judge, local_model);

    let ratings = RatingStore::open(&config.ratings_file)
        .with_context(|| format!("failed to open ratings at {}", config.ratings_file.display()))?;
    let records = JsonFileRecordSink::new(&config.output_dir);

    info!(
        agents = contestants.len(),
        judge = %config.judge.name,
        cloud = backends.has_cloud(),
        output = %config.output_dir.display(),
        "tournament configured"
    );

    let tournament = Tournament::new(contestants, judge, config.settings.clone())
        .context("invalid roster")?
        .with_ratings(Arc::new(ratings))
        .with_record_sink(Arc::new(records));
    Ok(tournament)
}
