//! Code Arena core library
//!
//! Runs tournaments between code-generation agents on a single programming task:
//! - Round 1: every agent generates a candidate, which is benchmarked out of process
//!   and scored for cyclomatic complexity
//! - Adjudication: a judge picks a leader and critiques the rest, with a deterministic
//!   fallback whenever the judge fails
//! - Round 2: every other agent refines against the leader's code and the critique
//! - Finalization: the champion is ranked, Elo ratings are updated once, and the
//!   battle record is persisted
//!
//! # Flow
//!
//! ```text
//! Initializing → Round1Generation → Round1Benchmarking ─┬─ no survivors → AbortedNoSurvivors
//!                                                       └─ Adjudication → [checkpoint]
//! [checkpoint + human critique] → Round2Refinement → Round2Benchmarking → Finalized
//! ```
//!
//! The two phases can run back to back (`Tournament::run`) or be split around a
//! serializable `BattleCheckpoint` so a human reviewer can inject critique between
//! adjudication and refinement.
//!
//! Inference backends, CLI and configuration files live in the `arena-agents` crate;
//! this crate only sees the narrow traits in [`agent`].

#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod complexity;
pub mod feed;
pub mod harness;
pub mod python;
pub mod rating;
pub mod sink;
pub mod submission;
pub mod tournament;
pub mod verdict;

pub use agent::{AgentCapability, AgentProfile, CapabilityError, JudgingCapability, ModelTier};
pub use complexity::{score as complexity_score, COMPLEXITY_PENALTY};
pub use feed::{BattleFeed, LogSink, NullLogSink, SharedBattleFeed, TracingLogSink};
pub use harness::{
    BenchmarkOutcome, BenchmarkResult, Benchmarker, ExecutionHarness, HarnessConfig,
    DID_NOT_COMPLETE_SECS,
};
pub use rating::{RatingError, RatingLedger, RatingStore, BASELINE_RATING};
pub use sink::{JsonFileRecordSink, MemoryRecordSink, RecordSink, SinkError};
pub use submission::Submission;
pub use tournament::{
    BattleCheckpoint, BattleRecord, ChampionPolicy, HumanCritiques, RoundOneOutcome, Tournament,
    TournamentError, TournamentPhase, TournamentSettings,
};
pub use verdict::{Verdict, VerdictProtocol, JUDGE_ERROR_REASONING};
