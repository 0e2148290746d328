//! Tournament tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::harness::HarnessConfig;

/// What the round-1 leader submits for round 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChampionPolicy {
    /// Re-enter the round-1 submission unchanged.
    #[default]
    Defend,
    /// Ask the leader for a fresh generation.
    Regenerate,
}

impl std::fmt::Display for ChampionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defend => write!(f, "defend"),
            Self::Regenerate => write!(f, "regenerate"),
        }
    }
}

/// Configuration for one tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentSettings {
    pub harness: HarnessConfig,
    /// Bound on one generate/refine call (seconds)
    pub generation_timeout_secs: u64,
    /// Bound on the judge call (seconds)
    pub judge_timeout_secs: u64,
    /// Fan out generation and benchmarking across agents
    pub parallel_agents: bool,
    pub champion_policy: ChampionPolicy,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            generation_timeout_secs: 300,
            judge_timeout_secs: 300,
            parallel_agents: false,
            champion_policy: ChampionPolicy::Defend,
        }
    }
}

impl TournamentSettings {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs.max(1))
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = TournamentSettings::default();
        assert_eq!(s.generation_timeout(), Duration::from_secs(300));
        assert_eq!(s.judge_timeout(), Duration::from_secs(300));
        assert!(!s.parallel_agents);
        assert_eq!(s.champion_policy, ChampionPolicy::Defend);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: TournamentSettings = serde_json::from_str(
            r#"{"parallel_agents": true, "champion_policy": "regenerate", "harness": {"repetitions": 10}}"#,
        )
        .unwrap();
        assert!(s.parallel_agents);
        assert_eq!(s.champion_policy, ChampionPolicy::Regenerate);
        assert_eq!(s.harness.repetitions, 10);
        assert_eq!(s.harness.timeout_secs, 10);
        assert_eq!(s.generation_timeout_secs, 300);
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let s = TournamentSettings {
            generation_timeout_secs: 0,
            ..TournamentSettings::default()
        };
        assert_eq!(s.generation_timeout(), Duration::from_secs(1));
    }
}
