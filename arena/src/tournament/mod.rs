//! Tournament Orchestration: Generate, Judge, Refine
//!
//! A tournament is one programming problem played by every configured agent
//! across two rounds, with a judge choosing the round-1 leader in between.
//!
//! # Tournament Flow
//!
//! ```text
//! Initializing → Round1Generation → Round1Benchmarking ─┬─ all failed → AbortedNoSurvivors
//!                                                       │                 (record written)
//!                                                       └─ Adjudication
//!                                                              │
//!                                                   [BattleCheckpoint]
//!                                                     + human critique
//!                                                              │
//!                      Finalized ← Round2Benchmarking ← Round2Refinement
//!                  (record, then ratings)
//! ```

pub mod checkpoint;
pub mod orchestrator;
pub mod record;
pub mod settings;
pub mod state;

pub use checkpoint::{BattleCheckpoint, CheckpointError};
pub use orchestrator::{RoundOneOutcome, Tournament, TournamentError};
pub use record::{BattleRecord, HumanCritiques};
pub use settings::{ChampionPolicy, TournamentSettings};
pub use state::{PhaseLog, PhaseTransition, TournamentPhase, TransitionError};
