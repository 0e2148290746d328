//! One agent's code for one round, plus its measured outcome.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::agent::CapabilityError;
use crate::complexity::COMPLEXITY_PENALTY;
use crate::harness::{BenchmarkResult, DID_NOT_COMPLETE_SECS};

/// Immutable once created. Field names on the wire match the dashboard's
/// `_data.json` reader (`time`, `msg`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub agent: String,
    /// 1 or 2.
    pub round: u8,
    pub code: String,
    pub complexity: u32,
    /// Average seconds per call, or [`DID_NOT_COMPLETE_SECS`].
    #[serde(rename = "time")]
    pub execution_time: f64,
    pub success: bool,
    #[serde(rename = "msg")]
    pub message: String,
}

impl Submission {
    pub fn from_benchmark(
        agent: &str,
        round: u8,
        code: String,
        complexity: u32,
        result: BenchmarkResult,
    ) -> Self {
        Self {
            agent: agent.to_string(),
            round,
            code,
            complexity,
            execution_time: result.elapsed_secs.min(DID_NOT_COMPLETE_SECS),
            success: result.success,
            message: result.message,
        }
    }

    /// The agent produced no code for this round.
    pub fn generation_failed(agent: &str, round: u8, error: &CapabilityError) -> Self {
        Self {
            agent: agent.to_string(),
            round,
            code: String::new(),
            complexity: COMPLEXITY_PENALTY,
            execution_time: DID_NOT_COMPLETE_SECS,
            success: false,
            message: format!("Generation Error: {}", error),
        }
    }

    /// Same code and measurements, re-entered for round 2.
    pub fn defended(&self) -> Self {
        Self {
            round: 2,
            ..self.clone()
        }
    }

    /// Successes before failures, then faster before slower.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        (!self.success)
            .cmp(&!other.success)
            .then_with(|| self.execution_time.total_cmp(&other.execution_time))
    }

    /// One-line summary used in progress logs and reports.
    pub fn summary(&self) -> String {
        format!(
            "{} | Time: {:.6}s | Comp: {} | Success: {}",
            self.agent, self.execution_time, self.complexity, self.success
        )
    }
}

/// Stable ranking of `submissions` by [`Submission::rank_cmp`].
pub fn ranked(submissions: &[Submission]) -> Vec<&Submission> {
    let mut order: Vec<&Submission> = submissions.iter().collect();
    order.sort_by(|a, b| a.rank_cmp(b));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(agent: &str, success: bool, time: f64) -> Submission {
        Submission {
            agent: agent.into(),
            round: 2,
            code: String::new(),
            complexity: 1,
            execution_time: time,
            success,
            message: String::new(),
        }
    }

    #[test]
    fn test_ranking_successes_first_then_time() {
        let subs = vec![
            sub("slow", true, 0.5),
            sub("broken_fast", false, 0.0001),
            sub("fast", true, 0.01),
            sub("dnf", false, DID_NOT_COMPLETE_SECS),
        ];
        let order: Vec<_> = ranked(&subs).into_iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(order, vec!["fast", "slow", "broken_fast", "dnf"]);
    }

    #[test]
    fn test_ranking_ties_keep_input_order() {
        let subs = vec![sub("a", true, 0.1), sub("b", true, 0.1)];
        let order: Vec<_> = ranked(&subs).into_iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_generation_failure_is_worst_case() {
        let s = Submission::generation_failed("Tim", 1, &CapabilityError::Timeout(300));
        assert!(!s.success);
        assert_eq!(s.execution_time, DID_NOT_COMPLETE_SECS);
        assert_eq!(s.complexity, COMPLEXITY_PENALTY);
        assert_eq!(s.message, "Generation Error: timed out after 300s");
    }

    #[test]
    fn test_defended_copy_is_round_two() {
        let mut original = sub("champ", true, 0.01);
        original.round = 1;
        let copy = original.defended();
        assert_eq!(copy.round, 2);
        assert_eq!(copy.code, original.code);
        assert_eq!(copy.execution_time, original.execution_time);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(sub("a", true, 0.25)).unwrap();
        assert_eq!(json["time"], 0.25);
        assert!(json.get("msg").is_some());
        assert!(json.get("execution_time").is_none());
    }
}
