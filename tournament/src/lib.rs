//! Debate arena tournament engine.
//!
//! Four synthetic debaters argue a claim across up to ten rounds. Each
//! round runs four phases in order:
//! 1. Assessment: every debater privately rates the claim.
//! 2. Statement: every debater argues its position.
//! 3. Revision: every debater reads the full debate and may revise.
//! 4. Ranking: every debater ranks the other three.
//!
//! Ranked ballots become points; in the elimination window the lowest
//! scorer is eliminated and the top scorer is cloned into the freed slot,
//! so the population stays at four. Each claim arrives over an in-process
//! input channel between rounds, and everything the engine does is
//! published on a broadcast event bus. Sessions persist as JSON snapshots
//! plus per-debater round records, and can resume mid-tournament.

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod completion;
pub mod config;
pub mod engine;
pub mod events;
pub mod phase;
pub mod registry;
pub mod scoring;
pub mod session;
pub mod stage;

// Re-export key participant types
pub use agent::{
    clamp_confidence, Agent, AgentId, CONFIDENCE_MAX, CONFIDENCE_MIN, CONFIDENCE_NEUTRAL,
};

// Re-export key completion types
pub use completion::{
    complete_structured, extract_json, Completion, CompletionError, CompletionResult,
    HttpCompletion,
};

// Re-export configuration
pub use config::ArenaConfig;

// Re-export key engine types
pub use engine::{GameEngine, GameReport};
pub use phase::PhaseRunner;
pub use stage::{RoundStage, StageMachine};

// Re-export key event types
pub use events::{
    AgentMessage, AgentState, ArenaBus, ArenaEvent, GlobalState, InputReceiver, PeerRank,
    SharedArenaBus, TransportError, TransportResult,
};

// Re-export key registry types
pub use registry::{GameGuard, GameRegistry, RegistryError, RegistryResult};

// Re-export key scoring types
pub use scoring::{compute_scores, score_summary, select_loser, select_winner, ScoreCard};

// Re-export key session types
pub use session::{
    RoundRecord, Session, SessionId, SessionStore, Snapshot, StoreError, StoreResult,
};
