//! Arena configuration: the roster file plus endpoint settings from the environment.
//!
//! ## Roster file (YAML)
//!
//! ```yaml
//! output_dir: output
//! ratings_file: output/elo_ratings.json
//! settings:
//!   parallel_agents: false
//!   champion_policy: defend
//! judge:
//!   name: Judge_Judy
//!   role: Adjudicator
//!   model: gpt-4o
//!   tier: cloud
//! agents:
//!   - name: Turbo_Tim
//!     role: Speed Freak
//!     model: llama3.1
//!     prompt_file: prompts/turbo_tim.txt
//! ```
//!
//! `prompt_file` paths are relative to the roster file. Each agent needs either a
//! `prompt_file` or an inline `personality`.
//!
//! ## Endpoints (environment)
//!
//! | Variable              | Default                     |
//! |-----------------------|-----------------------------|
//! | `ARENA_LOCAL_URL`     | `http://localhost:11434/v1` |
//! | `ARENA_LOCAL_API_KEY` | `local`                     |
//! | `ARENA_CLOUD_URL`     | unset (no cloud tier)       |
//! | `ARENA_CLOUD_API_KEY` | unset (no cloud tier)       |
//! | `ARENA_CLOUD_MODEL`   | `gpt-4o` (default judge)    |
//! | `ARENA_PYTHON`        | `python3`                   |

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use arena::{AgentProfile, ModelTier, TournamentSettings};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::prompts::JUDGE_SYSTEM_PROMPT;

const DEFAULT_LOCAL_URL: &str = "http://localhost:11434/v1";
const DEFAULT_CLOUD_MODEL: &str = "gpt-4o";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid roster file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("could not read prompt file {path} for agent '{agent}': {source}")]
    Prompt {
        agent: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("agent '{0}' has neither prompt_file nor personality")]
    MissingPersonality(String),

    #[error("agent '{0}' has no model")]
    MissingModel(String),

    #[error("roster lists no agents")]
    NoAgents,

    #[error("agent name '{0}' appears more than once")]
    DuplicateAgent(String),
}

/// One roster entry as written in the file.
#[derive(Debug, Clone, Deserialize)]
struct AgentEntry {
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    prompt_file: Option<PathBuf>,
    #[serde(default)]
    personality: Option<String>,
    #[serde(default)]
    tier: ModelTier,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    agents: Vec<AgentEntry>,
    #[serde(default)]
    judge: Option<AgentEntry>,
    #[serde(default)]
    settings: TournamentSettings,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    ratings_file: Option<PathBuf>,
}

/// Fully resolved configuration: prompts loaded, defaults applied.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub agents: Vec<AgentProfile>,
    pub judge: AgentProfile,
    pub settings: TournamentSettings,
    pub output_dir: PathBuf,
    pub ratings_file: PathBuf,
}

impl ArenaConfig {
    /// Load a roster file. Prompt files are resolved against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&text, base)
    }

    pub fn from_yaml(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let file: RosterFile = serde_yaml::from_str(text)?;
        if file.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }

        let mut seen = HashSet::new();
        let mut agents = Vec::with_capacity(file.agents.len());
        for entry in &file.agents {
            if !seen.insert(entry.name.clone()) {
                return Err(ConfigError::DuplicateAgent(entry.name.clone()));
            }
            agents.push(resolve_profile(entry, base_dir, None)?);
        }

        let judge = match &file.judge {
            Some(entry) => resolve_profile(entry, base_dir, Some(JUDGE_SYSTEM_PROMPT))?,
            None => default_judge(|key| std::env::var(key).ok()),
        };

        let output_dir = file.output_dir.unwrap_or_else(|| PathBuf::from("output"));
        let ratings_file = file
            .ratings_file
            .unwrap_or_else(|| output_dir.join("elo_ratings.json"));

        debug!(agents = agents.len(), judge = %judge.name, "roster loaded");
        Ok(Self {
            agents,
            judge,
            settings: file.settings,
            output_dir,
            ratings_file,
        })
    }
}

fn resolve_profile(
    entry: &AgentEntry,
    base_dir: &Path,
    fallback_personality: Option<&str>,
) -> Result<AgentProfile, ConfigError> {
    if entry.model.trim().is_empty() {
        return Err(ConfigError::MissingModel(entry.name.clone()));
    }
    let personality = match (&entry.prompt_file, &entry.personality) {
        (Some(file), _) => {
            let path = base_dir.join(file);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Prompt {
                agent: entry.name.clone(),
                path,
                source,
            })?
        }
        (None, Some(inline)) => inline.clone(),
        (None, None) => match fallback_personality {
            Some(text) => text.to_string(),
            None => return Err(ConfigError::MissingPersonality(entry.name.clone())),
        },
    };
    Ok(AgentProfile {
        name: entry.name.clone(),
        role: entry.role.clone(),
        model: entry.model.clone(),
        personality,
        tier: entry.tier,
    })
}

/// Judge used when the roster names none: the cloud tier on `ARENA_CLOUD_MODEL`.
fn default_judge(lookup: impl Fn(&str) -> Option<String>) -> AgentProfile {
    let model = lookup("ARENA_CLOUD_MODEL").unwrap_or_else(|| DEFAULT_CLOUD_MODEL.to_string());
    AgentProfile::new("Judge", "Adjudicator", &model, JUDGE_SYSTEM_PROMPT)
        .with_tier(ModelTier::Cloud)
}

/// Local inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEndpoint {
    pub url: String,
    pub api_key: String,
}

/// Cloud endpoint; only present when both URL and key are set. The model is
/// chosen per profile, not per endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEndpoint {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub local: LocalEndpoint,
    pub cloud: Option<CloudEndpoint>,
}

impl Endpoints {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let local = LocalEndpoint {
            url: lookup("ARENA_LOCAL_URL").unwrap_or_else(|| DEFAULT_LOCAL_URL.to_string()),
            api_key: lookup("ARENA_LOCAL_API_KEY").unwrap_or_else(|| "local".to_string()),
        };
        let cloud = match (lookup("ARENA_CLOUD_URL"), lookup("ARENA_CLOUD_API_KEY")) {
            (Some(url), Some(api_key)) => Some(CloudEndpoint { url, api_key }),
            _ => None,
        };
        Self { local, cloud }
    }
}
