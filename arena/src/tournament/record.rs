//! Battle Record: the durable outcome of one tournament.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{PhaseTransition, TournamentPhase};
use crate::submission::Submission;
use crate::verdict::Verdict;

/// Written exactly once per tournament, at finalization or at early abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub battle_id: String,
    pub timestamp: DateTime<Utc>,
    pub problem: String,
    pub test_input: Value,
    pub expected_output: Option<Value>,
    /// `None` when nobody succeeded in round 2 (or the battle aborted).
    pub champion: Option<String>,
    pub log_lines: Vec<String>,
    /// Round-1 submissions followed by round-2 submissions, each in agent order.
    pub results: Vec<Submission>,
    /// `None` on abort.
    pub judge_verdict: Option<Verdict>,
    pub phase: TournamentPhase,
    #[serde(default)]
    pub transitions: Vec<PhaseTransition>,
}

impl BattleRecord {
    pub fn round(&self, round: u8) -> impl Iterator<Item = &Submission> {
        self.results.iter().filter(move |s| s.round == round)
    }

    /// Champion name, or `"no one"`.
    pub fn champion_label(&self) -> &str {
        self.champion.as_deref().unwrap_or("no one")
    }

    /// Ranking of the last round that was played.
    pub fn final_ranking(&self) -> Vec<&Submission> {
        let last = self.results.iter().map(|s| s.round).max().unwrap_or(1);
        let mut order: Vec<&Submission> = self.round(last).collect();
        order.sort_by(|a, b| a.rank_cmp(b));
        order
    }

    /// Human-readable report: the progress log followed by the final standings.
    pub fn report(&self) -> String {
        let mut out = self.log_lines.join("\n");
        let rule = "=".repeat(50);
        let _ = write!(out, "\n\n{}\nFINAL CHAMPIONSHIP RANKINGS\n{}\n", rule, rule);
        for (rank, sub) in self.final_ranking().into_iter().enumerate() {
            if sub.success {
                let _ = writeln!(
                    out,
                    "{}. {} (R{}) | Time: {:.8}s | Complexity: {}",
                    rank + 1,
                    sub.agent,
                    sub.round,
                    sub.execution_time,
                    sub.complexity
                );
            } else {
                let _ = writeln!(
                    out,
                    "FAILED: {} (R{}) | Msg: {}",
                    sub.agent, sub.round, sub.message
                );
            }
        }
        let _ = writeln!(out, "\nChampion: {}", self.champion_label());
        out
    }
}

/// Optional human critique per agent, supplied between the two phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanCritiques(BTreeMap<String, String>);

impl HumanCritiques {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, agent: &str, critique: &str) -> Self {
        self.0.insert(agent.to_string(), critique.to_string());
        self
    }

    /// Critique for `agent`, empty when none was given.
    pub fn get(&self, agent: &str) -> &str {
        self.0.get(agent).map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for HumanCritiques {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
