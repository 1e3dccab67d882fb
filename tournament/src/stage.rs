//! Round stage machine with explicit states and legal transition guards.
//!
//! The engine moves through a fixed sequence of stages each round. Modeling
//! the sequence as a typed machine means:
//! 1. Every stage change is auditable and logged.
//! 2. A transition that skips or reorders a phase is caught and reported.
//! 3. The transition log reconstructs exactly what a game did and when.
//!
//! The engine calls `advance()` to move between stages. Each call validates
//! that the transition is legal and records it in the transition log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of round stages.
///
/// Every game starts at `AwaitingClaim` and terminates at `GameOver`. The
/// four phase stages always run in order; no phase can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStage {
    /// Blocked until the round's claim arrives or the input window lapses.
    AwaitingClaim,
    /// Phase 1: every living participant assesses the claim.
    Assessment,
    /// Phase 2: every living participant argues its position.
    Statement,
    /// Phase 3: every living participant reads the debate and may revise.
    Revision,
    /// Phase 4: every living participant ranks its three opponents.
    Ranking,
    /// Scoring, elimination, cloning, and persistence.
    Resolution,
    /// The round is persisted; the next one may begin.
    RoundComplete,
    /// The game ended, terminal state.
    GameOver,
}

impl RoundStage {
    /// Whether this is a terminal stage (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GameOver)
    }

    /// The 1-based phase number for the four debate stages.
    pub fn phase_number(self) -> Option<u8> {
        match self {
            Self::Assessment => Some(1),
            Self::Statement => Some(2),
            Self::Revision => Some(3),
            Self::Ranking => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for RoundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingClaim => write!(f, "AwaitingClaim"),
            Self::Assessment => write!(f, "Assessment"),
            Self::Statement => write!(f, "Statement"),
            Self::Revision => write!(f, "Revision"),
            Self::Ranking => write!(f, "Ranking"),
            Self::Resolution => write!(f, "Resolution"),
            Self::RoundComplete => write!(f, "RoundComplete"),
            Self::GameOver => write!(f, "GameOver"),
        }
    }
}

/// Legal transitions between round stages.
///
/// The transition table encodes the valid edges in the stage graph:
/// ```text
/// AwaitingClaim → Assessment | GameOver
/// Assessment → Statement | GameOver
/// Statement → Revision | GameOver
/// Revision → Ranking | GameOver
/// Ranking → Resolution | GameOver
/// Resolution → RoundComplete | GameOver
/// RoundComplete → AwaitingClaim | GameOver
/// ```
fn is_legal_transition(from: RoundStage, to: RoundStage) -> bool {
    use RoundStage::*;

    // Any non-terminal stage can end the game.
    if to == GameOver && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (AwaitingClaim, Assessment)
            | (Assessment, Statement)
            | (Statement, Revision)
            | (Revision, Ranking)
            | (Ranking, Resolution)
            | (Resolution, RoundComplete)
            // Back to the top for the next round
            | (RoundComplete, AwaitingClaim)
    )
}

/// A single recorded stage transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    /// The stage transitioned from.
    pub from: RoundStage,
    /// The stage transitioned to.
    pub to: RoundStage,
    /// Round number at the time of transition (0 before the first round).
    pub round: u32,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal stage transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: RoundStage,
    pub to: RoundStage,
}

/// The round stage machine.
///
/// Tracks the current stage, enforces legal transitions, and maintains a
/// complete log of all transitions for replay and diagnostics.
pub struct StageMachine {
    current: RoundStage,
    round: u32,
    created_at: Instant,
    transitions: Vec<StageTransition>,
}

impl StageMachine {
    /// Create a new machine starting at `AwaitingClaim`.
    pub fn new() -> Self {
        Self {
            current: RoundStage::AwaitingClaim,
            round: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// Get the current stage.
    pub fn current(&self) -> RoundStage {
        self.current
    }

    /// Get the current round number.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Set the round counter (called by the engine when a round opens).
    pub fn set_round(&mut self, round: u32) {
        self.round = round;
    }

    /// Attempt to advance to the next stage.
    ///
    /// Returns `Ok(())` if the transition is legal, or `Err(IllegalTransition)`
    /// if the transition would violate the stage graph.
    pub fn advance(
        &mut self,
        to: RoundStage,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = StageTransition {
            from: self.current,
            to,
            round: self.round,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            round = self.round,
            "Stage transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `GameOver` from any non-terminal stage.
    pub fn end(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(RoundStage::GameOver, Some(reason))
    }

    /// Whether the machine is in a terminal stage.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    /// Get a summary string of the machine's history.
    pub fn summary(&self) -> String {
        format!(
            "{} → {} (round {}, {} transitions)",
            RoundStage::AwaitingClaim,
            self.current,
            self.round,
            self.transitions.len(),
        )
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}
