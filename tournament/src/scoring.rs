//! Peer-vote tallying and elimination selection.
//!
//! Every ranking phase produces one ballot per living participant, each
//! ranking the three others. Rank 1 is worth 3 points, rank 2 is worth 2,
//! rank 3 is worth 1. Selection sorts on a composite key (points, first
//! places, confidence distance from neutral, then id for stability) and
//! draws uniformly at random only among participants tied on the first
//! three criteria.

use std::collections::HashMap;

use rand::Rng;

use crate::agent::{Agent, AgentId, CONFIDENCE_NEUTRAL};
use crate::events::AgentMessage;

/// Per-participant tally for one ranking phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCard {
    /// Participant being scored.
    pub agent_id: AgentId,

    /// Points received from peers.
    pub total_points: i32,

    /// Number of rank-1 votes received.
    pub first_places: u32,

    /// Participant's confidence when the votes were cast.
    pub confidence: i32,
}

impl ScoreCard {
    /// Distance of the confidence from neutral. Close to neutral reads as
    /// indecisive; far from neutral reads as committed.
    fn confidence_distance(&self) -> i32 {
        (self.confidence - CONFIDENCE_NEUTRAL).abs()
    }
}

/// Tally the ranking ballots into one score card per living participant.
///
/// Ballots are keyed by voter id. Entries naming an id that is not living
/// are skipped; ranks outside 1..=3 still award between 1 and 3 points.
pub fn compute_scores<'a>(
    ballots: &HashMap<AgentId, AgentMessage>,
    living: impl IntoIterator<Item = &'a Agent>,
) -> HashMap<AgentId, ScoreCard> {
    let mut scores: HashMap<AgentId, ScoreCard> = living
        .into_iter()
        .map(|agent| {
            (
                agent.id.clone(),
                ScoreCard {
                    agent_id: agent.id.clone(),
                    total_points: 0,
                    first_places: 0,
                    confidence: agent.confidence,
                },
            )
        })
        .collect();

    for ballot in ballots.values() {
        for entry in &ballot.rankings {
            let Some(card) = scores.get_mut(&entry.agent_id) else {
                continue;
            };

            card.total_points += (4 - entry.rank).clamp(1, 3);
            if entry.rank == 1 {
                card.first_places += 1;
            }
        }
    }

    scores
}

/// Pick the participant to eliminate: fewest points, then fewest first
/// places, then confidence closest to neutral, random among exact ties.
pub fn select_loser<R: Rng>(
    scores: &HashMap<AgentId, ScoreCard>,
    rng: &mut R,
) -> Option<AgentId> {
    let mut ordered: Vec<&ScoreCard> = scores.values().collect();
    ordered.sort_by(|a, b| {
        a.total_points
            .cmp(&b.total_points)
            .then(a.first_places.cmp(&b.first_places))
            .then(a.confidence_distance().cmp(&b.confidence_distance()))
            .then(a.agent_id.cmp(&b.agent_id))
    });
    draw_from_tie_group(&ordered, rng)
}

/// Pick the participant to clone: most points, then most first places, then
/// confidence farthest from neutral, random among exact ties.
pub fn select_winner<R: Rng>(
    scores: &HashMap<AgentId, ScoreCard>,
    rng: &mut R,
) -> Option<AgentId> {
    let mut ordered: Vec<&ScoreCard> = scores.values().collect();
    ordered.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.first_places.cmp(&a.first_places))
            .then(b.confidence_distance().cmp(&a.confidence_distance()))
            .then(a.agent_id.cmp(&b.agent_id))
    });
    draw_from_tie_group(&ordered, rng)
}

/// Collect the head of a sorted card list that is exactly tied on points,
/// first places, and confidence distance, and draw one uniformly.
fn draw_from_tie_group<R: Rng>(ordered: &[&ScoreCard], rng: &mut R) -> Option<AgentId> {
    let head = ordered.first()?;
    let head_key = (head.total_points, head.first_places, head.confidence_distance());

    let tied: Vec<&&ScoreCard> = ordered
        .iter()
        .take_while(|card| {
            (card.total_points, card.first_places, card.confidence_distance()) == head_key
        })
        .collect();

    let selected = if tied.len() > 1 {
        tied[rng.random_range(0..tied.len())]
    } else {
        tied[0]
    };
    Some(selected.agent_id.clone())
}

/// How the peers ranked one participant, keyed by voter name.
///
/// Voters are identified against the supplied (id, name) roster, which
/// should cover everyone who cast a ballot that round even if they did not
/// survive it.
pub fn rankings_for(
    ballots: &HashMap<AgentId, AgentMessage>,
    target_id: &str,
    voters: &[(AgentId, String)],
) -> HashMap<String, i32> {
    let mut rankings = HashMap::new();
    for (voter_id, ballot) in ballots {
        let Some((_, voter_name)) = voters.iter().find(|(id, _)| id == voter_id) else {
            continue;
        };
        if let Some(entry) = ballot.rankings.iter().find(|e| e.agent_id == target_id) {
            rankings.insert(voter_name.clone(), entry.rank);
        }
    }
    rankings
}

/// One-line score digest for logging, living participants in slot order.
pub fn score_summary<'a>(
    scores: &HashMap<AgentId, ScoreCard>,
    living: impl IntoIterator<Item = &'a Agent>,
) -> String {
    living
        .into_iter()
        .filter_map(|agent| {
            scores.get(&agent.id).map(|card| {
                format!(
                    "{}: {}pts ({} firsts)",
                    agent.name, card.total_points, card.first_places
                )
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::initial_cohort;
    use crate::events::PeerRank;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card(id: &str, points: i32, firsts: u32, confidence: i32) -> (AgentId, ScoreCard) {
        (
            id.to_string(),
            ScoreCard {
                agent_id: id.to_string(),
                total_points: points,
                first_places: firsts,
                confidence,
            },
        )
    }

    fn ballot(voter: &Agent, ranks: &[(&Agent, i32)]) -> (AgentId, AgentMessage) {
        let entries = ranks
            .iter()
            .map(|(target, rank)| PeerRank {
                agent_id: target.id.clone(),
                rank: *rank,
            })
            .collect();
        let message = AgentMessage::new(&voter.id, &voter.name, 1, 4, "").with_rankings(entries);
        (voter.id.clone(), message)
    }

    #[test]
    fn test_full_round_awards_six_points_per_ballot() {
        let agents = initial_cohort();
        let [a, b, c, d] = &agents;

        let ballots: HashMap<_, _> = [
            ballot(a, &[(b, 1), (c, 2), (d, 3)]),
            ballot(b, &[(a, 1), (c, 2), (d, 3)]),
            ballot(c, &[(a, 1), (b, 2), (d, 3)]),
            ballot(d, &[(a, 1), (b, 2), (c, 3)]),
        ]
        .into_iter()
        .collect();

        let scores = compute_scores(&ballots, agents.iter());
        assert_eq!(scores.len(), 4);

        let total: i32 = scores.values().map(|c| c.total_points).sum();
        assert_eq!(total, 24, "four full ballots of 3+2+1 points each");
    }

    #[test]
    fn test_unanimous_first_place() {
        let agents = initial_cohort();
        let [a, b, c, d] = &agents;

        let ballots: HashMap<_, _> = [
            ballot(b, &[(a, 1), (c, 2), (d, 3)]),
            ballot(c, &[(a, 1), (b, 2), (d, 3)]),
            ballot(d, &[(a, 1), (b, 2), (c, 3)]),
        ]
        .into_iter()
        .collect();

        let scores = compute_scores(&ballots, agents.iter());
        let top = &scores[&a.id];
        assert_eq!(top.total_points, 9);
        assert_eq!(top.first_places, 3);
    }

    #[test]
    fn test_unknown_targets_are_skipped() {
        let agents = initial_cohort();
        let [a, b, c, d] = &agents;

        let mut ghost = a.clone();
        ghost.id = "long-gone".to_string();

        let ballots: HashMap<_, _> =
            [ballot(a, &[(&ghost, 1), (b, 2), (c, 3)])].into_iter().collect();

        let scores = compute_scores(&ballots, agents.iter());
        assert!(!scores.contains_key("long-gone"));
        assert_eq!(scores[&b.id].total_points, 2);
        assert_eq!(scores[&c.id].total_points, 1);
        assert_eq!(scores[&d.id].total_points, 0);
    }

    #[test]
    fn test_out_of_range_ranks_still_award_bounded_points() {
        let agents = initial_cohort();
        let [a, b, c, _] = &agents;

        let ballots: HashMap<_, _> =
            [ballot(a, &[(b, 0), (c, 7)])].into_iter().collect();

        let scores = compute_scores(&ballots, agents.iter());
        assert_eq!(scores[&b.id].total_points, 3, "rank 0 caps at 3 points");
        assert_eq!(scores[&b.id].first_places, 0, "rank 0 is not a first place");
        assert_eq!(scores[&c.id].total_points, 1, "rank 7 floors at 1 point");
    }

    #[test]
    fn test_select_loser_is_deterministic_without_ties() {
        let scores: HashMap<_, _> = [
            card("a", 9, 3, 4),
            card("b", 5, 0, 3),
            card("c", 6, 1, 2),
            card("d", 4, 0, 3),
        ]
        .into_iter()
        .collect();

        for seed in [1u64, 99, 4096] {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(select_loser(&scores, &mut rng).as_deref(), Some("d"));
        }
    }

    #[test]
    fn test_loser_tie_breaks_on_first_places_then_confidence() {
        // Equal points: fewer firsts loses.
        let scores: HashMap<_, _> =
            [card("a", 5, 0, 5), card("b", 5, 1, 5)].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(select_loser(&scores, &mut rng).as_deref(), Some("a"));

        // Equal points and firsts: confidence nearest neutral loses.
        let scores: HashMap<_, _> =
            [card("a", 5, 1, 3), card("b", 5, 1, 5)].into_iter().collect();
        assert_eq!(select_loser(&scores, &mut rng).as_deref(), Some("a"));
    }

    #[test]
    fn test_winner_prefers_decisive_confidence() {
        let scores: HashMap<_, _> =
            [card("a", 7, 2, 3), card("b", 7, 2, 1)].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            select_winner(&scores, &mut rng).as_deref(),
            Some("b"),
            "confidence 1 is farther from neutral than 3"
        );
    }

    #[test]
    fn test_exact_ties_draw_both_ways() {
        let scores: HashMap<_, _> =
            [card("a", 5, 1, 4), card("b", 5, 1, 2)].into_iter().collect();

        let mut picks: HashMap<String, u32> = HashMap::new();
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let loser = select_loser(&scores, &mut rng).unwrap();
            *picks.entry(loser).or_default() += 1;
        }

        assert!(picks["a"] >= 60, "a picked {} of 200", picks["a"]);
        assert!(picks["b"] >= 60, "b picked {} of 200", picks["b"]);
    }

    #[test]
    fn test_empty_scores_select_nothing() {
        let scores = HashMap::new();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_loser(&scores, &mut rng).is_none());
        assert!(select_winner(&scores, &mut rng).is_none());
    }

    #[test]
    fn test_rankings_for_keys_by_voter_name() {
        let agents = initial_cohort();
        let [a, b, c, d] = &agents;

        let ballots: HashMap<_, _> = [
            ballot(b, &[(a, 1), (c, 2), (d, 3)]),
            ballot(c, &[(a, 2), (b, 1), (d, 3)]),
        ]
        .into_iter()
        .collect();

        let roster: Vec<_> = agents
            .iter()
            .map(|agent| (agent.id.clone(), agent.name.clone()))
            .collect();
        let rankings = rankings_for(&ballots, &a.id, &roster);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[&b.name], 1);
        assert_eq!(rankings[&c.name], 2);

        // A voter missing from the roster cannot be named, so their entry is skipped.
        let rankings = rankings_for(&ballots, &a.id, &roster[..2]);
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[&b.name], 1);
    }

    #[test]
    fn test_score_summary_follows_slot_order() {
        let agents = initial_cohort();
        let ballots = HashMap::new();
        let scores = compute_scores(&ballots, agents.iter());

        let summary = score_summary(&scores, agents.iter());
        assert!(summary.starts_with(&format!("{}: 0pts", agents[0].name)));
        assert_eq!(summary.matches("0pts").count(), 4);
    }
}
