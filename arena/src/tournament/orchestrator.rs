//! Tournament orchestrator: drives generation, benchmarking, adjudication,
//! refinement, ranking and the rating update.
//!
//! Usage:
//! 1. Build with [`Tournament::new`] and the `with_*` setters
//! 2. Either call [`Tournament::run`] for both phases back to back, or
//! 3. Call [`Tournament::run_round_one`], keep the returned checkpoint, and later
//!    call [`Tournament::run_round_two`] with optional human critique
//!
//! Side effects (source files, battle record, ratings) happen only after a phase
//! has finished its work, so a cancelled phase leaves nothing behind.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{Local, Utc};
use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::checkpoint::{BattleCheckpoint, CheckpointError};
use super::record::{BattleRecord, HumanCritiques};
use super::settings::{ChampionPolicy, TournamentSettings};
use super::state::{PhaseLog, TournamentPhase, TransitionError};
use crate::agent::{AgentCapability, CapabilityError, JudgingCapability};
use crate::complexity;
use crate::feed::{LogSink, TracingLogSink};
use crate::harness::{Benchmarker, ExecutionHarness};
use crate::rating::{RatingError, RatingLedger, RatingStore};
use crate::sink::{MemoryRecordSink, RecordSink, SinkError};
use crate::submission::{ranked, Submission};
use crate::verdict::{Verdict, VerdictProtocol};

/// Critique handed to a refining agent when neither judge nor human gave one.
const NO_CRITIQUE: &str =
    "No specific critique was given. Study the winning solution and beat it.";

#[derive(Error, Debug)]
pub enum TournamentError {
    #[error("a tournament needs at least one agent")]
    NoAgents,

    #[error("duplicate agent name '{0}'")]
    DuplicateAgent(String),

    #[error("tournament cancelled during {0}")]
    Cancelled(TournamentPhase),

    #[error("{0}")]
    Transition(#[from] TransitionError),

    #[error("checkpoint rejected: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("checkpoint agents do not match this tournament: {0}")]
    AgentMismatch(String),

    #[error("failed to persist battle record: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to update ratings: {0}")]
    Rating(#[from] RatingError),
}

/// Result of phase 1.
#[derive(Debug, Clone)]
pub enum RoundOneOutcome {
    /// Every round-1 submission failed; the record has already been persisted.
    Aborted(BattleRecord),
    /// A leader was chosen; resume with [`Tournament::run_round_two`].
    Adjudicated(BattleCheckpoint),
}

enum RoundOneStage {
    NoSurvivors(Vec<Submission>),
    Judged(Vec<Submission>, Verdict),
}

enum Pending {
    Defended(Submission),
    Generated(Result<String, CapabilityError>),
}

/// Borrowed view of a checkpoint while round 2 is played.
struct RoundTwoInputs<'a> {
    problem: &'a str,
    input: &'a Value,
    expected: Option<&'a Value>,
    round_one: &'a [Submission],
    leader: &'a Submission,
    verdict: &'a Verdict,
    human: &'a HumanCritiques,
}

/// A configured tournament. Holds no per-battle state, so one instance can run
/// many battles and resume checkpoints written by other processes.
pub struct Tournament {
    agents: Vec<Arc<dyn AgentCapability>>,
    verdicts: VerdictProtocol,
    benchmarker: Arc<dyn Benchmarker>,
    ratings: Arc<dyn RatingLedger>,
    records: Arc<dyn RecordSink>,
    log: Arc<dyn LogSink>,
    settings: TournamentSettings,
    cancel: CancellationToken,
}

impl Tournament {
    /// Agents compete in the given order. Defaults: out-of-process harness from
    /// `settings.harness`, in-memory ratings and records, tracing log sink.
    pub fn new(
        agents: Vec<Arc<dyn AgentCapability>>,
        judge: Arc<dyn JudgingCapability>,
        settings: TournamentSettings,
    ) -> Result<Self, TournamentError> {
        if agents.is_empty() {
            return Err(TournamentError::NoAgents);
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if !seen.insert(agent.name().to_string()) {
                return Err(TournamentError::DuplicateAgent(agent.name().to_string()));
            }
        }

        Ok(Self {
            agents,
            verdicts: VerdictProtocol::new(judge).with_timeout(settings.judge_timeout()),
            benchmarker: Arc::new(ExecutionHarness::new(settings.harness.clone())),
            ratings: Arc::new(RatingStore::in_memory()),
            records: Arc::new(MemoryRecordSink::new()),
            log: Arc::new(TracingLogSink),
            settings,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_benchmarker(mut self, benchmarker: Arc<dyn Benchmarker>) -> Self {
        self.benchmarker = benchmarker;
        self
    }

    pub fn with_ratings(mut self, ratings: Arc<dyn RatingLedger>) -> Self {
        self.ratings = ratings;
        self
    }

    pub fn with_record_sink(mut self, records: Arc<dyn RecordSink>) -> Self {
        self.records = records;
        self
    }

    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that abandons whichever phase is in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &TournamentSettings {
        &self.settings
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// Both phases back to back.
    pub async fn run(
        &self,
        problem: &str,
        test_input: Value,
        expected_output: Option<Value>,
        human: &HumanCritiques,
    ) -> Result<BattleRecord, TournamentError> {
        match self.run_round_one(problem, test_input, expected_output).await? {
            RoundOneOutcome::Aborted(record) => Ok(record),
            RoundOneOutcome::Adjudicated(checkpoint) => self.run_round_two(checkpoint, human).await,
        }
    }

    /// Phase 1: generation, benchmarking and adjudication.
    pub async fn run_round_one(
        &self,
        problem: &str,
        test_input: Value,
        expected_output: Option<Value>,
    ) -> Result<RoundOneOutcome, TournamentError> {
        let battle_id = new_battle_id();
        let timestamp = Utc::now();
        let mut phases = PhaseLog::new();
        let mut lines = Vec::new();

        info!(battle_id = %battle_id, agents = self.agents.len(), "battle started");
        self.say(&mut lines, format!("BATTLE ID: {}", battle_id));
        self.say(&mut lines, format!("PROBLEM: {}", problem));

        let work = self.play_round_one(
            problem,
            &test_input,
            expected_output.as_ref(),
            &mut phases,
            &mut lines,
        );
        let Some(stage) = self.cancellable(work).await else {
            warn!(battle_id = %battle_id, phase = %phases.phase, "battle cancelled");
            return Err(TournamentError::Cancelled(phases.phase));
        };

        match stage? {
            RoundOneStage::NoSurvivors(round_one) => {
                self.save_sources(&battle_id, &round_one);
                let record = BattleRecord {
                    battle_id,
                    timestamp,
                    problem: problem.to_string(),
                    test_input,
                    expected_output,
                    champion: None,
                    log_lines: lines,
                    results: round_one,
                    judge_verdict: None,
                    phase: phases.phase,
                    transitions: phases.transitions,
                };
                self.records.save_record(&record)?;
                warn!(battle_id = %record.battle_id, "battle aborted: no survivors");
                Ok(RoundOneOutcome::Aborted(record))
            }
            RoundOneStage::Judged(round_one, verdict) => {
                self.save_sources(&battle_id, &round_one);
                info!(battle_id = %battle_id, leader = ?verdict.winner, "round 1 adjudicated");
                Ok(RoundOneOutcome::Adjudicated(BattleCheckpoint {
                    version: BattleCheckpoint::CURRENT_VERSION,
                    battle_id,
                    timestamp,
                    problem: problem.to_string(),
                    test_input,
                    expected_output,
                    round_one,
                    verdict,
                    log_lines: lines,
                    phases,
                }))
            }
        }
    }

    async fn play_round_one(
        &self,
        problem: &str,
        input: &Value,
        expected: Option<&Value>,
        phases: &mut PhaseLog,
        lines: &mut Vec<String>,
    ) -> Result<RoundOneStage, TournamentError> {
        phases.transition(TournamentPhase::Round1Generation, "battle started")?;
        self.say(lines, "--- ROUND 1: GENERATION ---");
        let generated = self
            .in_agent_order(
                self.agents
                    .iter()
                    .map(|agent| self.bounded(agent.generate(problem)))
                    .collect(),
            )
            .await;

        phases.transition(TournamentPhase::Round1Benchmarking, "all agents answered")?;
        let round_one = self
            .in_agent_order(
                self.agents
                    .iter()
                    .zip(generated)
                    .map(|(agent, code)| self.score(agent.name(), 1, code, input, expected))
                    .collect(),
            )
            .await;
        for sub in &round_one {
            self.say(lines, sub.summary());
        }

        if !round_one.iter().any(|s| s.success) {
            phases.transition(
                TournamentPhase::AbortedNoSurvivors,
                "no successful round-1 submission",
            )?;
            self.say(lines, "EVERYONE FAILED ROUND 1. ABORTING BATTLE.");
            return Ok(RoundOneStage::NoSurvivors(round_one));
        }

        phases.transition(TournamentPhase::Adjudication, "round 1 has survivors")?;
        let verdict = self.verdicts.adjudicate(problem, &round_one).await;
        let source = if verdict.is_fallback() { "fallback" } else { "judge" };
        self.say(
            lines,
            format!(
                "ROUND 1 LEADER: {} ({}) | {}",
                verdict.winner.as_deref().unwrap_or("no one"),
                source,
                verdict.reasoning
            ),
        );
        Ok(RoundOneStage::Judged(round_one, verdict))
    }

    /// Phase 2: refinement, benchmarking, ranking, record and rating update.
    pub async fn run_round_two(
        &self,
        checkpoint: BattleCheckpoint,
        human: &HumanCritiques,
    ) -> Result<BattleRecord, TournamentError> {
        checkpoint.validate()?;
        let names = self.agent_names();
        let recorded: Vec<String> = checkpoint.round_one.iter().map(|s| s.agent.clone()).collect();
        if recorded != names {
            return Err(TournamentError::AgentMismatch(format!(
                "checkpoint has [{}], tournament has [{}]",
                recorded.join(", "),
                names.join(", ")
            )));
        }
        let leader = checkpoint
            .leader()
            .cloned()
            .ok_or_else(|| CheckpointError::IntegrityCheckFailed("no leader".into()))?;

        let BattleCheckpoint {
            battle_id,
            timestamp,
            problem,
            test_input,
            expected_output,
            round_one,
            verdict,
            log_lines: mut lines,
            mut phases,
            ..
        } = checkpoint;

        let work = self.play_round_two(
            RoundTwoInputs {
                problem: &problem,
                input: &test_input,
                expected: expected_output.as_ref(),
                round_one: &round_one,
                leader: &leader,
                verdict: &verdict,
                human,
            },
            &mut phases,
            &mut lines,
        );
        let Some(stage) = self.cancellable(work).await else {
            warn!(battle_id = %battle_id, phase = %phases.phase, "battle cancelled");
            return Err(TournamentError::Cancelled(phases.phase));
        };
        let (round_two, champion) = stage?;

        let fresh: Vec<Submission> = round_two
            .iter()
            .filter(|s| !(s.agent == leader.agent && self.defends()))
            .cloned()
            .collect();
        self.save_sources(&battle_id, &fresh);

        let mut results = round_one;
        results.extend(round_two);
        let record = BattleRecord {
            battle_id,
            timestamp,
            problem,
            test_input,
            expected_output,
            champion,
            log_lines: lines,
            results,
            judge_verdict: Some(verdict),
            phase: phases.phase,
            transitions: phases.transitions,
        };
        self.records.save_record(&record)?;

        match &record.champion {
            Some(champion) => {
                self.ratings.update_ratings(&names, champion)?;
                info!(
                    battle_id = %record.battle_id,
                    champion = %champion,
                    rating = self.ratings.rating(champion),
                    "battle finalized"
                );
            }
            None => info!(battle_id = %record.battle_id, "battle finalized without a champion"),
        }
        Ok(record)
    }

    async fn play_round_two(
        &self,
        inputs: RoundTwoInputs<'_>,
        phases: &mut PhaseLog,
        lines: &mut Vec<String>,
    ) -> Result<(Vec<Submission>, Option<String>), TournamentError> {
        phases.transition(TournamentPhase::Round2Refinement, "refinement started")?;
        self.say(lines, "--- ROUND 2: REFINEMENT ---");

        let pending = self
            .in_agent_order(
                self.agents
                    .iter()
                    .map(|agent| self.refine_one(agent, &inputs))
                    .collect(),
            )
            .await;

        phases.transition(TournamentPhase::Round2Benchmarking, "all agents refined")?;
        let round_two = self
            .in_agent_order(
                self.agents
                    .iter()
                    .zip(pending)
                    .map(|(agent, pending)| self.settle(agent.name(), pending, &inputs))
                    .collect(),
            )
            .await;

        for sub in &round_two {
            if sub.agent == inputs.leader.agent && self.defends() {
                self.say(lines, format!("{} defends their title.", sub.agent));
                continue;
            }
            let before = inputs.round_one.iter().find(|s| s.agent == sub.agent);
            self.say(
                lines,
                format!(
                    "{} (R2) | Time: {:.6}s | Result: {}",
                    sub.agent,
                    sub.execution_time,
                    progress_note(before, sub)
                ),
            );
        }

        let champion = ranked(&round_two)
            .first()
            .filter(|top| top.success)
            .map(|top| top.agent.clone());
        let label = champion.as_deref().unwrap_or("no one");
        phases.transition(TournamentPhase::Finalized, &format!("champion: {}", label))?;
        self.say(lines, format!("CHAMPION: {}", label));
        Ok((round_two, champion))
    }

    fn defends(&self) -> bool {
        self.settings.champion_policy == ChampionPolicy::Defend
    }

    async fn settle(&self, agent: &str, pending: Pending, inputs: &RoundTwoInputs<'_>) -> Submission {
        match pending {
            Pending::Defended(sub) => sub,
            Pending::Generated(code) => self.score(agent, 2, code, inputs.input, inputs.expected).await,
        }
    }

    async fn refine_one(&self, agent: &Arc<dyn AgentCapability>, inputs: &RoundTwoInputs<'_>) -> Pending {
        let name = agent.name();
        let leader = inputs.leader;
        if name == leader.agent {
            return match self.settings.champion_policy {
                ChampionPolicy::Defend => Pending::Defended(leader.defended()),
                ChampionPolicy::Regenerate => {
                    Pending::Generated(self.bounded(agent.generate(inputs.problem)).await)
                }
            };
        }
        let own = inputs
            .round_one
            .iter()
            .find(|s| s.agent == name)
            .map(|s| s.code.as_str())
            .unwrap_or("");
        let critique = combined_critique(inputs.verdict.critique_for(name), inputs.human.get(name));
        Pending::Generated(
            self.bounded(agent.refine(inputs.problem, own, &leader.code, &critique))
                .await,
        )
    }

    async fn score(
        &self,
        agent: &str,
        round: u8,
        generated: Result<String, CapabilityError>,
        input: &Value,
        expected: Option<&Value>,
    ) -> Submission {
        match generated {
            Ok(code) => {
                let complexity = complexity::score(&code);
                let result = self.benchmarker.benchmark(&code, input, expected).await;
                Submission::from_benchmark(agent, round, code, complexity, result)
            }
            Err(e) => {
                warn!(agent, round, error = %e, "no code produced");
                Submission::generation_failed(agent, round, &e)
            }
        }
    }

    /// Apply the generation timeout to one capability call.
    async fn bounded(
        &self,
        call: impl Future<Output = Result<String, CapabilityError>>,
    ) -> Result<String, CapabilityError> {
        let limit = self.settings.generation_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(limit.as_secs())),
        }
    }

    /// Await per-agent futures, one at a time or all together; output order
    /// always matches agent order.
    async fn in_agent_order<F: Future>(&self, futures: Vec<F>) -> Vec<F::Output> {
        if self.settings.parallel_agents {
            return join_all(futures).await;
        }
        let mut out = Vec::with_capacity(futures.len());
        for fut in futures {
            out.push(fut.await);
        }
        out
    }

    async fn cancellable<T>(
        &self,
        work: impl Future<Output = Result<T, TournamentError>>,
    ) -> Option<Result<T, TournamentError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = work => Some(result),
        }
    }

    fn save_sources(&self, battle_id: &str, submissions: &[Submission]) {
        for sub in submissions.iter().filter(|s| !s.code.is_empty()) {
            if let Err(e) = self
                .records
                .save_source(battle_id, sub.round, &sub.agent, &sub.code)
            {
                warn!(battle_id, agent = %sub.agent, error = %e, "could not save generated source");
            }
        }
    }

    fn say(&self, lines: &mut Vec<String>, line: impl Into<String>) {
        let line = line.into();
        self.log.emit(&line);
        lines.push(line);
    }
}

/// Local wall-clock id, millisecond resolution.
fn new_battle_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

fn combined_critique(judge: &str, human: &str) -> String {
    let mut parts = Vec::new();
    if !judge.trim().is_empty() {
        parts.push(format!("JUDGE'S CRITIQUE:\n{}", judge.trim()));
    }
    if !human.trim().is_empty() {
        parts.push(format!("HUMAN REVIEWER'S CRITIQUE:\n{}", human.trim()));
    }
    if parts.is_empty() {
        NO_CRITIQUE.to_string()
    } else {
        parts.join("\n\n")
    }
}

fn progress_note(before: Option<&Submission>, now: &Submission) -> String {
    if !now.success {
        return format!("BROKE THE CODE: {}", now.message);
    }
    let gain = before.map(|b| b.execution_time - now.execution_time).unwrap_or(0.0);
    if gain > 0.0 {
        format!("IMPROVED by {:.6}s!", gain)
    } else {
        "No speed improvement.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_critique_sections() {
        assert_eq!(
            combined_critique("too slow", "use a set"),
            "JUDGE'S CRITIQUE:\ntoo slow\n\nHUMAN REVIEWER'S CRITIQUE:\nuse a set"
        );
        assert_eq!(combined_critique("", "  "), NO_CRITIQUE);
        assert_eq!(combined_critique("", "x"), "HUMAN REVIEWER'S CRITIQUE:\nx");
    }

    #[test]
    fn test_battle_id_shape() {
        let id = new_battle_id();
        // YYYYMMDD_HHMMSS_mmm
        assert_eq!(id.len(), 19);
        assert_eq!(id.matches('_').count(), 2);
    }

    #[test]
    fn test_progress_note() {
        let mut before = Submission {
            agent: "A".into(),
            round: 1,
            code: String::new(),
            complexity: 1,
            execution_time: 0.5,
            success: true,
            message: "Success".into(),
        };
        let mut now = before.clone();
        now.round = 2;
        now.execution_time = 0.2;
        assert!(progress_note(Some(&before), &now).starts_with("IMPROVED by 0.300000s"));

        before.execution_time = 0.1;
        assert_eq!(progress_note(Some(&before), &now), "No speed improvement.");

        now.success = false;
        now.message = "Wrong Answer. Got 6, expected 10".into();
        assert_eq!(
            progress_note(Some(&before), &now),
            "BROKE THE CODE: Wrong Answer. Got 6, expected 10"
        );
    }
}
