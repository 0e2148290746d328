//! Verdict Protocol: ask the judge, accept only a verdict that names a successful
//! round-1 agent, and otherwise fall back deterministically.
//!
//! [`VerdictProtocol::adjudicate`] never fails. Transport errors, timeouts,
//! replies without JSON and ineligible winners all produce [`Verdict::fallback`].

mod evidence;
mod parse;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::JudgingCapability;
use crate::submission::Submission;

/// `reasoning` of every fallback verdict.
pub const JUDGE_ERROR_REASONING: &str = "Judge Error";

/// Default bound on one judge call.
pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Adjudication result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// `None` means no valid winner.
    pub winner: Option<String>,
    /// Agent name to critique. May be partial or empty.
    #[serde(default)]
    pub critiques: BTreeMap<String, String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Verdict {
    /// First successful round-1 agent, no critiques, `"Judge Error"` reasoning.
    pub fn fallback(round_one: &[Submission]) -> Self {
        Self {
            winner: round_one
                .iter()
                .find(|s| s.success)
                .map(|s| s.agent.clone()),
            critiques: BTreeMap::new(),
            reasoning: JUDGE_ERROR_REASONING.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.reasoning == JUDGE_ERROR_REASONING && self.critiques.is_empty()
    }

    /// Critique for `agent`, empty when the judge gave none.
    pub fn critique_for(&self, agent: &str) -> &str {
        self.critiques.get(agent).map(String::as_str).unwrap_or("")
    }

    /// Whether the winner is absent or names a successful round-1 agent.
    pub fn respects(&self, round_one: &[Submission]) -> bool {
        match &self.winner {
            None => true,
            Some(w) => round_one.iter().any(|s| s.success && &s.agent == w),
        }
    }
}

/// Drives one judging call per tournament.
#[derive(Clone)]
pub struct VerdictProtocol {
    judge: Arc<dyn JudgingCapability>,
    timeout: Duration,
}

impl VerdictProtocol {
    pub fn new(judge: Arc<dyn JudgingCapability>) -> Self {
        Self {
            judge,
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the evidence document the judge would see.
    pub fn evidence(&self, problem: &str, round_one: &[Submission]) -> String {
        evidence::build(problem, round_one)
    }

    pub async fn adjudicate(&self, problem: &str, round_one: &[Submission]) -> Verdict {
        let document = evidence::build(problem, round_one);

        let raw = match tokio::time::timeout(self.timeout, self.judge.ask(&document)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "judge unavailable, using fallback verdict");
                return Verdict::fallback(round_one);
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "judge timed out, using fallback verdict"
                );
                return Verdict::fallback(round_one);
            }
        };

        match parse::parse_verdict(&raw, round_one) {
            Ok(verdict) => {
                info!(winner = ?verdict.winner, critiques = verdict.critiques.len(), "verdict accepted");
                verdict
            }
            Err(reason) => {
                warn!(%reason, "judge reply rejected, using fallback verdict");
                Verdict::fallback(round_one)
            }
        }
    }
}
