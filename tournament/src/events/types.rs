//! Event types published on the arena bus.
//!
//! Every variant carries the session it belongs to and a timestamp, so a
//! single subscriber can watch several games at once. Payload shapes mirror
//! what the engine persists: a subscriber sees the same participant fields
//! the snapshot holds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};
use crate::session::SessionId;

/// What a participant task is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// The completion call is in flight.
    Thinking,
    /// The task has produced (or fallen back to) its output.
    Done,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Thinking => write!(f, "thinking"),
            AgentState::Done => write!(f, "done"),
        }
    }
}

/// One ranking entry cast by a voter in phase 4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRank {
    /// The ranked participant. Resolved to an id by the orchestrator; an
    /// entry whose name could not be resolved is dropped before this point.
    pub agent_id: String,

    /// 1 = most convincing, 3 = least convincing.
    pub rank: i32,
}

/// A participant's output for one phase of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Author of the message.
    pub agent_id: AgentId,

    /// Author's display name.
    pub agent_name: String,

    /// Round the message belongs to.
    pub round: u32,

    /// Phase number, 1 through 4.
    pub phase: u8,

    /// Free-text content (reasoning, statement, or raw ranking response).
    pub content: String,

    /// Confidence reported in phases 1 and 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,

    /// Ranking of the other participants, phase 4 only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rankings: Vec<PeerRank>,

    /// Revised stance, phase 4 only, already validated into [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_stance: Option<f64>,
}

impl AgentMessage {
    /// Create a message with only text content.
    pub fn new(
        agent_id: impl Into<AgentId>,
        agent_name: impl Into<String>,
        round: u32,
        phase: u8,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            round,
            phase,
            content: content.into(),
            confidence: None,
            rankings: Vec::new(),
            revised_stance: None,
        }
    }

    /// Attach a reported confidence.
    pub fn with_confidence(mut self, confidence: i32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Attach a cast ranking.
    pub fn with_rankings(mut self, rankings: Vec<PeerRank>) -> Self {
        self.rankings = rankings;
        self
    }

    /// Attach a revised stance.
    pub fn with_revised_stance(mut self, stance: f64) -> Self {
        self.revised_stance = Some(stance);
        self
    }
}

/// Omniscient point-in-time view of a session, published after each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Session this state belongs to.
    pub session_id: SessionId,

    /// Claim debated in the most recent round.
    pub claim: String,

    /// Last completed round.
    pub round: u32,

    /// Phase the state was captured after (4 for end-of-round snapshots).
    pub phase: u8,

    /// Living participants in slot order.
    pub agents: Vec<Agent>,

    /// Eliminated participants, oldest first.
    pub graveyard: Vec<Agent>,

    /// Total points per participant for the captured round.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scores: HashMap<AgentId, i32>,
}

/// Everything the engine announces about a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// A round has its claim and is about to run phase 1.
    RoundStart {
        session_id: SessionId,
        round: u32,
        claim: String,
        /// Derived context line: prior eliminations and current competitors.
        context: String,
        timestamp: DateTime<Utc>,
    },

    /// A phase is starting for every living participant.
    PhaseStart {
        session_id: SessionId,
        round: u32,
        phase: u8,
        timestamp: DateTime<Utc>,
    },

    /// Per-participant task progress.
    AgentStatus {
        session_id: SessionId,
        agent_id: AgentId,
        state: AgentState,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A participant's full output for a phase.
    AgentOutput {
        session_id: SessionId,
        message: AgentMessage,
        timestamp: DateTime<Utc>,
    },

    /// A participant was eliminated.
    Death {
        session_id: SessionId,
        agent_id: AgentId,
        agent_name: String,
        round: u32,
        cause: String,
        timestamp: DateTime<Utc>,
    },

    /// The round winner was cloned into the freed slot.
    Cloned {
        session_id: SessionId,
        parent_id: AgentId,
        parent_name: String,
        child_id: AgentId,
        child_name: String,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// Full session snapshot after a round's resolution.
    StateSnapshot {
        session_id: SessionId,
        state: GlobalState,
        timestamp: DateTime<Utc>,
    },

    /// The engine is blocked waiting for the round's claim.
    AwaitingInput {
        session_id: SessionId,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// The game is over.
    GameEnd {
        session_id: SessionId,
        /// Names of the participants still alive.
        survivors: Vec<String>,
        /// Rounds that ran to completion, in order.
        rounds: Vec<u32>,
        timestamp: DateTime<Utc>,
    },
}

impl ArenaEvent {
    /// Stable tag for logging and filtering, matching the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            ArenaEvent::RoundStart { .. } => "round_start",
            ArenaEvent::PhaseStart { .. } => "phase_start",
            ArenaEvent::AgentStatus { .. } => "agent_status",
            ArenaEvent::AgentOutput { .. } => "agent_output",
            ArenaEvent::Death { .. } => "death",
            ArenaEvent::Cloned { .. } => "cloned",
            ArenaEvent::StateSnapshot { .. } => "state_snapshot",
            ArenaEvent::AwaitingInput { .. } => "awaiting_input",
            ArenaEvent::GameEnd { .. } => "game_end",
        }
    }

    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            ArenaEvent::RoundStart { session_id, .. }
            | ArenaEvent::PhaseStart { session_id, .. }
            | ArenaEvent::AgentStatus { session_id, .. }
            | ArenaEvent::AgentOutput { session_id, .. }
            | ArenaEvent::Death { session_id, .. }
            | ArenaEvent::Cloned { session_id, .. }
            | ArenaEvent::StateSnapshot { session_id, .. }
            | ArenaEvent::AwaitingInput { session_id, .. }
            | ArenaEvent::GameEnd { session_id, .. } => session_id,
        }
    }

    /// When the event was published.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ArenaEvent::RoundStart { timestamp, .. }
            | ArenaEvent::PhaseStart { timestamp, .. }
            | ArenaEvent::AgentStatus { timestamp, .. }
            | ArenaEvent::AgentOutput { timestamp, .. }
            | ArenaEvent::Death { timestamp, .. }
            | ArenaEvent::Cloned { timestamp, .. }
            | ArenaEvent::StateSnapshot { timestamp, .. }
            | ArenaEvent::AwaitingInput { timestamp, .. }
            | ArenaEvent::GameEnd { timestamp, .. } => *timestamp,
        }
    }

    /// Round the event refers to, when it refers to one.
    pub fn round(&self) -> Option<u32> {
        match self {
            ArenaEvent::RoundStart { round, .. }
            | ArenaEvent::PhaseStart { round, .. }
            | ArenaEvent::Death { round, .. }
            | ArenaEvent::Cloned { round, .. }
            | ArenaEvent::AwaitingInput { round, .. } => Some(*round),
            ArenaEvent::AgentOutput { message, .. } => Some(message.round),
            ArenaEvent::StateSnapshot { state, .. } => Some(state.round),
            ArenaEvent::AgentStatus { .. } | ArenaEvent::GameEnd { .. } => None,
        }
    }
}
