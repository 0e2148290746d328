//! Tournament state machine: phases, legal transitions, and transition history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentPhase {
    /// Agents and judge constructed, nothing run yet.
    Initializing,
    /// Every agent is producing its first candidate.
    Round1Generation,
    /// Round-1 candidates are being executed and scored.
    Round1Benchmarking,
    /// The judge is choosing a leader. Phase 1 stops here.
    Adjudication,
    /// Non-leaders are refining against the leader's code.
    Round2Refinement,
    /// Round-2 candidates are being executed and scored.
    Round2Benchmarking,
    /// Champion ranked, ratings updated, record persisted.
    Finalized,
    /// Every round-1 candidate failed.
    AbortedNoSurvivors,
}

impl TournamentPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::AbortedNoSurvivors)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [TournamentPhase] {
        match self {
            Self::Initializing => &[Self::Round1Generation],
            Self::Round1Generation => &[Self::Round1Benchmarking],
            Self::Round1Benchmarking => &[Self::Adjudication, Self::AbortedNoSurvivors],
            Self::Adjudication => &[Self::Round2Refinement],
            Self::Round2Refinement => &[Self::Round2Benchmarking],
            Self::Round2Benchmarking => &[Self::Finalized],
            Self::Finalized | Self::AbortedNoSurvivors => &[],
        }
    }
}

impl std::fmt::Display for TournamentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Round1Generation => write!(f, "round1_generation"),
            Self::Round1Benchmarking => write!(f, "round1_benchmarking"),
            Self::Adjudication => write!(f, "adjudication"),
            Self::Round2Refinement => write!(f, "round2_refinement"),
            Self::Round2Benchmarking => write!(f, "round2_benchmarking"),
            Self::Finalized => write!(f, "finalized"),
            Self::AbortedNoSurvivors => write!(f, "aborted_no_survivors"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: TournamentPhase,
    pub to: TournamentPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: TournamentPhase,
    pub to: TournamentPhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} -> {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// Current phase plus how the tournament got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLog {
    pub phase: TournamentPhase,
    pub transitions: Vec<PhaseTransition>,
}

impl Default for PhaseLog {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseLog {
    pub fn new() -> Self {
        Self {
            phase: TournamentPhase::Initializing,
            transitions: Vec::new(),
        }
    }

    /// Move to `to`, recording why.
    pub fn transition(&mut self, to: TournamentPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Whether the recorded history is a legal path from `Initializing` to `phase`.
    pub fn is_consistent(&self) -> bool {
        let mut at = TournamentPhase::Initializing;
        for t in &self.transitions {
            if t.from != at || !at.valid_transitions().contains(&t.to) {
                return false;
            }
            at = t.to;
        }
        at == self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut log = PhaseLog::new();
        for (to, why) in [
            (TournamentPhase::Round1Generation, "start"),
            (TournamentPhase::Round1Benchmarking, "generated"),
            (TournamentPhase::Adjudication, "survivors"),
            (TournamentPhase::Round2Refinement, "resume"),
            (TournamentPhase::Round2Benchmarking, "refined"),
            (TournamentPhase::Finalized, "ranked"),
        ] {
            log.transition(to, why).unwrap();
        }
        assert_eq!(log.phase, TournamentPhase::Finalized);
        assert!(log.phase.is_terminal());
        assert_eq!(log.transitions.len(), 6);
        assert!(log.is_consistent());
    }

    #[test]
    fn test_abort_only_from_round1_benchmarking() {
        let mut log = PhaseLog::new();
        assert!(log
            .transition(TournamentPhase::AbortedNoSurvivors, "too early")
            .is_err());
        log.transition(TournamentPhase::Round1Generation, "start").unwrap();
        log.transition(TournamentPhase::Round1Benchmarking, "gen").unwrap();
        log.transition(TournamentPhase::AbortedNoSurvivors, "all failed")
            .unwrap();
        assert!(log.phase.is_terminal());
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let mut log = PhaseLog::new();
        let err = log
            .transition(TournamentPhase::Finalized, "skip ahead")
            .unwrap_err();
        assert_eq!(err.from, TournamentPhase::Initializing);
        assert_eq!(err.to, TournamentPhase::Finalized);
        assert!(err.to_string().contains("initializing -> finalized"));
        assert_eq!(log.phase, TournamentPhase::Initializing);
        assert!(log.transitions.is_empty());
    }

    #[test]
    fn test_terminal_phases_have_no_exits() {
        assert!(TournamentPhase::Finalized.valid_transitions().is_empty());
        assert!(TournamentPhase::AbortedNoSurvivors
            .valid_transitions()
            .is_empty());
    }

    #[test]
    fn test_tampered_history_is_inconsistent() {
        let mut log = PhaseLog::new();
        log.transition(TournamentPhase::Round1Generation, "start").unwrap();
        log.phase = TournamentPhase::Adjudication;
        assert!(!log.is_consistent());
    }

    #[test]
    fn test_phase_serde() {
        let json = serde_json::to_string(&TournamentPhase::Round2Refinement).unwrap();
        assert_eq!(json, "\"round2_refinement\"");
    }
}
