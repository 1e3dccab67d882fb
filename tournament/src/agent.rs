//! Participant lifecycle: creation, cloning, death.
//!
//! Agents are the debaters competing in the arena. Each holds a continuous
//! stance in [0, 1], a fixed volatility controlling how freely its reasoning
//! varies, and an integer confidence in [1, 5] revised every round.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Unique identifier for a participant (UUID v4, string form).
pub type AgentId = String;

/// Display names handed out in order; exhausted pools synthesize a name.
pub const NAME_POOL: [&str; 12] = [
    "Marcus", "Elena", "Victor", "Luna", "Dante", "Aria", "Felix", "Nova", "Oscar", "Zara", "Leon",
    "Maya",
];

/// Lower bound of the confidence scale.
pub const CONFIDENCE_MIN: i32 = 1;

/// Upper bound of the confidence scale.
pub const CONFIDENCE_MAX: i32 = 5;

/// Neutral confidence every new participant starts with.
pub const CONFIDENCE_NEUTRAL: i32 = 3;

/// Clamp a confidence value into the valid [1, 5] range.
pub fn clamp_confidence(confidence: i32) -> i32 {
    confidence.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

/// One debater in the cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,

    /// Display name, unique within a session.
    pub name: String,

    /// Ideological position: 0.0 one pole, 1.0 the opposite pole.
    pub stance: f64,

    /// Sampling freedom for this participant's reasoning, constant for life.
    pub volatility: f64,

    /// Current belief strength in [1, 5].
    pub confidence: i32,

    /// Whether the participant still occupies a slot.
    pub alive: bool,

    /// Parent identifier, set iff this participant is a clone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,

    /// Round the participant entered play.
    pub born_at_round: u32,

    /// Round the participant was eliminated; 0 while alive.
    pub died_at_round: u32,

    /// Cause tag stamped on elimination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_cause: Option<String>,
}

impl Agent {
    /// Create a participant with neutral confidence.
    pub fn new(name: impl Into<String>, stance: f64, volatility: f64, born_at_round: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            stance,
            volatility,
            confidence: CONFIDENCE_NEUTRAL,
            alive: true,
            parent_id: None,
            born_at_round,
            died_at_round: 0,
            death_cause: None,
        }
    }

    /// Build the clone that replaces an eliminated participant.
    ///
    /// The clone inherits the winner's stance and volatility exactly, resets
    /// confidence to neutral, and enters play on the following round. Its
    /// name is the first unused pool name, or a synthesized one once the
    /// pool is exhausted.
    pub fn clone_of(winner: &Agent, round: u32, used_names: &HashSet<String>) -> Self {
        let name = NAME_POOL
            .iter()
            .find(|candidate| !used_names.contains(**candidate))
            .map(|candidate| candidate.to_string())
            .unwrap_or_else(|| format!("Clone_{}_{}", winner.name, round));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            stance: winner.stance,
            volatility: winner.volatility,
            confidence: CONFIDENCE_NEUTRAL,
            alive: true,
            parent_id: Some(winner.id.clone()),
            born_at_round: round + 1,
            died_at_round: 0,
            death_cause: None,
        }
    }

    /// Apply a confidence update, clamped into [1, 5].
    pub fn set_confidence(&mut self, confidence: i32) {
        self.confidence = clamp_confidence(confidence);
    }

    /// Apply a revised stance if it lies within [0, 1].
    ///
    /// Returns whether the revision was accepted. Out-of-range values are
    /// ignored so a malformed response cannot push a participant off the
    /// spectrum.
    pub fn revise_stance(&mut self, stance: f64) -> bool {
        if (0.0..=1.0).contains(&stance) {
            self.stance = stance;
            true
        } else {
            false
        }
    }

    /// Stamp the death fields for an elimination in `round`.
    pub fn mark_eliminated(&mut self, round: u32) {
        self.alive = false;
        self.died_at_round = round;
        self.death_cause = Some(format!("eliminated_round_{}", round));
    }
}

/// The four starting participants, spanning the ideological range.
pub fn initial_cohort() -> [Agent; 4] {
    // (stance, volatility) seeds: the poles get looser sampling than the
    // moderates so the opening debate is not symmetric.
    let seeds = [(0.05, 0.7), (0.30, 0.5), (0.75, 0.5), (0.95, 0.7)];
    std::array::from_fn(|i| Agent::new(NAME_POOL[i], seeds[i].0, seeds[i].1, 1))
}

/// Coarse English label for a stance value, used in prompt construction.
pub fn stance_label(stance: f64) -> &'static str {
    if stance <= 0.1 {
        "far-right"
    } else if stance <= 0.35 {
        "right-leaning"
    } else if stance <= 0.65 {
        "centrist"
    } else if stance <= 0.9 {
        "left-leaning"
    } else {
        "far-left"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_confidence_bounds() {
        assert_eq!(clamp_confidence(-3), 1);
        assert_eq!(clamp_confidence(0), 1);
        assert_eq!(clamp_confidence(1), 1);
        assert_eq!(clamp_confidence(3), 3);
        assert_eq!(clamp_confidence(5), 5);
        assert_eq!(clamp_confidence(99), 5);
    }

    #[test]
    fn test_new_agent_starts_neutral_and_alive() {
        let agent = Agent::new("Marcus", 0.05, 0.7, 1);
        assert_eq!(agent.confidence, CONFIDENCE_NEUTRAL);
        assert!(agent.alive);
        assert_eq!(agent.died_at_round, 0);
        assert!(agent.parent_id.is_none());
        assert!(agent.death_cause.is_none());
    }

    #[test]
    fn test_initial_cohort_seeding() {
        let cohort = initial_cohort();
        assert_eq!(cohort.len(), 4);
        assert_eq!(cohort[0].name, "Marcus");
        assert_eq!(cohort[3].name, "Luna");
        assert_eq!(cohort[0].stance, 0.05);
        assert_eq!(cohort[0].volatility, 0.7);
        assert_eq!(cohort[1].stance, 0.30);
        assert_eq!(cohort[2].stance, 0.75);
        assert_eq!(cohort[3].stance, 0.95);

        let ids: HashSet<&str> = cohort.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids.len(), 4, "ids must be unique");
        for agent in &cohort {
            assert_eq!(agent.born_at_round, 1);
            assert_eq!(agent.confidence, CONFIDENCE_NEUTRAL);
        }
    }

    #[test]
    fn test_clone_inherits_winner_traits() {
        let mut winner = Agent::new("Elena", 0.30, 0.5, 1);
        winner.set_confidence(5);

        let used: HashSet<String> = ["Marcus", "Elena", "Victor", "Luna"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let clone = Agent::clone_of(&winner, 3, &used);
        assert_eq!(clone.name, "Dante", "first unused pool name");
        assert_eq!(clone.stance, winner.stance);
        assert_eq!(clone.volatility, winner.volatility);
        assert_eq!(clone.confidence, CONFIDENCE_NEUTRAL, "confidence resets");
        assert_eq!(clone.parent_id.as_deref(), Some(winner.id.as_str()));
        assert_eq!(clone.born_at_round, 4, "clone enters on the next round");
        assert!(clone.alive);
    }

    #[test]
    fn test_clone_synthesizes_name_when_pool_exhausted() {
        let winner = Agent::new("Maya", 0.95, 0.7, 1);
        let used: HashSet<String> = NAME_POOL.iter().map(|s| s.to_string()).collect();

        let clone = Agent::clone_of(&winner, 7, &used);
        assert_eq!(clone.name, "Clone_Maya_7");
    }

    #[test]
    fn test_set_confidence_clamps() {
        let mut agent = Agent::new("Victor", 0.75, 0.5, 1);
        agent.set_confidence(42);
        assert_eq!(agent.confidence, 5);
        agent.set_confidence(-1);
        assert_eq!(agent.confidence, 1);
    }

    #[test]
    fn test_revise_stance_rejects_out_of_range() {
        let mut agent = Agent::new("Luna", 0.95, 0.7, 1);
        assert!(agent.revise_stance(0.0), "far pole is a valid stance");
        assert_eq!(agent.stance, 0.0);
        assert!(agent.revise_stance(1.0));
        assert_eq!(agent.stance, 1.0);
        assert!(!agent.revise_stance(1.2));
        assert!(!agent.revise_stance(-0.1));
        assert_eq!(agent.stance, 1.0, "rejected revisions leave stance alone");
    }

    #[test]
    fn test_mark_eliminated_stamps_death_fields() {
        let mut agent = Agent::new("Aria", 0.30, 0.5, 1);
        agent.mark_eliminated(2);
        assert!(!agent.alive);
        assert_eq!(agent.died_at_round, 2);
        assert_eq!(agent.death_cause.as_deref(), Some("eliminated_round_2"));
    }

    #[test]
    fn test_stance_labels() {
        assert_eq!(stance_label(0.05), "far-right");
        assert_eq!(stance_label(0.30), "right-leaning");
        assert_eq!(stance_label(0.5), "centrist");
        assert_eq!(stance_label(0.75), "left-leaning");
        assert_eq!(stance_label(0.95), "far-left");

        // Bucket edges are inclusive on the right side.
        assert_eq!(stance_label(0.1), "far-right");
        assert_eq!(stance_label(0.35), "right-leaning");
        assert_eq!(stance_label(0.65), "centrist");
        assert_eq!(stance_label(0.9), "left-leaning");
    }
}
