//! Resumable state between adjudication and refinement.
//!
//! Phase 1 ends by producing a [`BattleCheckpoint`]; phase 2 starts from one.
//! The orchestrator keeps no session state of its own, so a host can write the
//! checkpoint to disk, collect human critique, and resume in another process.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::state::{PhaseLog, TournamentPhase};
use crate::submission::Submission;
use crate::verdict::Verdict;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("serialize failed: {0}")]
    SerializeFailed(String),

    #[error("deserialize failed: {0}")]
    DeserializeFailed(String),

    #[error("version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
}

/// Everything phase 2 needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleCheckpoint {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub battle_id: String,
    pub timestamp: DateTime<Utc>,
    pub problem: String,
    pub test_input: Value,
    pub expected_output: Option<Value>,
    /// Round-1 submissions in agent order.
    pub round_one: Vec<Submission>,
    pub verdict: Verdict,
    pub log_lines: Vec<String>,
    pub phases: PhaseLog,
}

impl BattleCheckpoint {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializeFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializeFailed(e.to_string()))?;
        if checkpoint.version > Self::CURRENT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: checkpoint.version,
            });
        }
        Ok(checkpoint)
    }

    /// The leader's round-1 submission.
    pub fn leader(&self) -> Option<&Submission> {
        let winner = self.verdict.winner.as_deref()?;
        self.round_one.iter().find(|s| s.agent == winner)
    }

    /// Check that phase 2 can safely start from this checkpoint.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        let fail = |reason: String| Err(CheckpointError::IntegrityCheckFailed(reason));

        if self.version > Self::CURRENT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: self.version,
            });
        }
        if self.battle_id.trim().is_empty() {
            return fail("empty battle id".into());
        }
        if self.phases.phase != TournamentPhase::Adjudication {
            return fail(format!(
                "checkpoint is in phase {}, expected {}",
                self.phases.phase,
                TournamentPhase::Adjudication
            ));
        }
        if !self.phases.is_consistent() {
            return fail("phase history does not lead to the recorded phase".into());
        }
        if self.round_one.is_empty() {
            return fail("no round-1 submissions".into());
        }
        let mut seen = HashSet::new();
        for sub in &self.round_one {
            if sub.round != 1 {
                return fail(format!("{} has a round-{} entry in round 1", sub.agent, sub.round));
            }
            if !seen.insert(sub.agent.as_str()) {
                return fail(format!("duplicate agent '{}'", sub.agent));
            }
        }
        if self.leader().is_none() || !self.verdict.respects(&self.round_one) {
            return fail(format!(
                "verdict winner {:?} is not a successful round-1 agent",
                self.verdict.winner
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sub(agent: &str, success: bool) -> Submission {
        Submission {
            agent: agent.into(),
            round: 1,
            code: "def solution(n):\n    return n * 2\n".into(),
            complexity: 1,
            execution_time: if success { 0.0001 } else { 999.0 },
            success,
            message: if success { "Success".into() } else { "Runtime Error: x".into() },
        }
    }

    fn checkpoint() -> BattleCheckpoint {
        let mut phases = PhaseLog::new();
        phases.transition(TournamentPhase::Round1Generation, "start").unwrap();
        phases.transition(TournamentPhase::Round1Benchmarking, "generated").unwrap();
        phases.transition(TournamentPhase::Adjudication, "survivors").unwrap();
        BattleCheckpoint {
            version: BattleCheckpoint::CURRENT_VERSION,
            battle_id: "20250101_120000_000".into(),
            timestamp: Utc::now(),
            problem: "double".into(),
            test_input: json!(5),
            expected_output: Some(json!(10)),
            round_one: vec![sub("A", false), sub("B", true)],
            verdict: Verdict::fallback(&[sub("A", false), sub("B", true)]),
            log_lines: vec![],
            phases,
        }
    }

    #[test]
    fn test_valid_checkpoint_roundtrips() {
        let cp = checkpoint();
        assert!(cp.validate().is_ok());
        let restored = BattleCheckpoint::from_json(&cp.to_json().unwrap()).unwrap();
        assert_eq!(restored, cp);
        assert_eq!(restored.leader().map(|s| s.agent.as_str()), Some("B"));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut cp = checkpoint();
        cp.version = 99;
        let json = serde_json::to_string(&cp).unwrap();
        assert_eq!(
            BattleCheckpoint::from_json(&json),
            Err(CheckpointError::VersionMismatch {
                expected: 1,
                found: 99
            })
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            BattleCheckpoint::from_json("not json"),
            Err(CheckpointError::DeserializeFailed(_))
        ));
    }

    #[test]
    fn test_failed_winner_rejected() {
        let mut cp = checkpoint();
        cp.verdict.winner = Some("A".into());
        assert!(matches!(
            cp.validate(),
            Err(CheckpointError::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let mut cp = checkpoint();
        cp.round_one.push(sub("B", true));
        let err = cp.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate agent 'B'"));
    }

    #[test]
    fn test_wrong_phase_rejected() {
        let mut cp = checkpoint();
        cp.phases = PhaseLog::new();
        assert!(cp.validate().is_err());
    }
}
