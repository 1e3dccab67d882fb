//! Full game loop against a deterministic scripted backend (no HTTP).
//!
//! The stub ranks debaters lexicographically by name, so every round has a
//! known loser (last name in sort order) and winner (first). Covers event
//! ordering, elimination and cloning, population stability, the elimination
//! window, and the three ways a game ends without playing a round.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

use tournament::{
    ArenaBus, ArenaConfig, ArenaEvent, Completion, CompletionResult, GameEngine, GameReport,
    PhaseRunner, SessionStore, SharedArenaBus,
};

/// Scripted backend: phase is inferred from the task text, rankings follow
/// name sort order (rank 1 = first alphabetically).
struct LexRanker;

#[async_trait::async_trait]
impl Completion for LexRanker {
    async fn complete(
        &self,
        _role: &str,
        task: &str,
        _temperature: f64,
        _timeout: Duration,
    ) -> CompletionResult<String> {
        if task.contains("\"rankings\"") {
            let listed = task
                .split("OTHER debaters (")
                .nth(1)
                .and_then(|rest| rest.split(')').next())
                .unwrap_or_default();
            let mut names: Vec<&str> = listed.split(", ").collect();
            names.sort_unstable();
            let entries: Vec<String> = names
                .iter()
                .enumerate()
                .map(|(i, name)| format!("{{\"name\":\"{}\",\"rank\":{}}}", name, i + 1))
                .collect();
            Ok(format!("{{\"rankings\":[{}]}}", entries.join(",")))
        } else if task.contains("final_take") {
            Ok(r#"{"confidence":3,"final_take":"Holding my line.","revised":false}"#.to_string())
        } else if task.contains("\"reasoning\"") {
            Ok(r#"{"confidence":4,"reasoning":"A measured first look."}"#.to_string())
        } else {
            Ok("I stand firm.".to_string())
        }
    }
}

fn rigged_game(dir: &std::path::Path, config: ArenaConfig) -> (GameEngine, SharedArenaBus) {
    let store = SessionStore::new(dir);
    let session = store.create("game-under-test", "").unwrap();
    let bus = ArenaBus::new().shared();
    let input = bus.claim_input();
    let runner = PhaseRunner::new(Arc::new(LexRanker), bus.clone(), config.call_timeout());
    let engine = GameEngine::new(session, store, runner, bus.clone(), input, config)
        .with_rng(StdRng::seed_from_u64(7));
    (engine, bus)
}

/// Answer every `AwaitingInput` with a fresh claim.
fn spawn_feeder(bus: &SharedArenaBus) {
    let feeder_bus = bus.clone();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ArenaEvent::AwaitingInput { round, .. }) => {
                    feeder_bus.submit_input(format!("Claim for round {round}"));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Run the engine while collecting every event through the end of the game.
async fn run_collecting(engine: GameEngine, bus: &SharedArenaBus) -> (GameReport, Vec<ArenaEvent>) {
    let mut rx = bus.subscribe();
    let game = tokio::spawn(engine.run());

    let mut events = Vec::new();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let done = matches!(event, ArenaEvent::GameEnd { .. });
                events.push(event);
                if done {
                    break;
                }
            }
            Err(err) => panic!("event stream broke: {err}"),
        }
    }

    let report = game.await.expect("engine task panicked");
    (report, events)
}

fn index_of(events: &[ArenaEvent], what: &str, pred: impl Fn(&ArenaEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("missing event: {what}"))
}

// ── Full tournament with eliminations ──────────────────────────────

#[tokio::test]
async fn test_full_game_eliminates_clones_and_keeps_population_at_four() {
    let dir = tempfile::tempdir().unwrap();
    let config = ArenaConfig::default()
        .with_max_rounds(4)
        .with_elimination_window(3);
    let (engine, bus) = rigged_game(dir.path(), config);
    spawn_feeder(&bus);

    let (report, events) = run_collecting(engine, &bus).await;

    // Lexicographic ranking kills Victor in round 1 (Elena cloned as Dante),
    // then Marcus in round 2 (Dante cloned as Aria). Rounds 3 and 4 fall
    // outside the elimination window.
    assert_eq!(report.rounds_completed, 4);
    assert_eq!(report.survivors, ["Aria", "Elena", "Dante", "Luna"]);

    let deaths: Vec<(String, u32, String)> = events
        .iter()
        .filter_map(|event| match event {
            ArenaEvent::Death {
                agent_name,
                round,
                cause,
                ..
            } => Some((agent_name.clone(), *round, cause.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        deaths,
        [
            ("Victor".to_string(), 1, "eliminated_round_1".to_string()),
            ("Marcus".to_string(), 2, "eliminated_round_2".to_string()),
        ]
    );

    let clones: Vec<(String, String, u32)> = events
        .iter()
        .filter_map(|event| match event {
            ArenaEvent::Cloned {
                parent_name,
                child_name,
                round,
                ..
            } => Some((parent_name.clone(), child_name.clone(), *round)),
            _ => None,
        })
        .collect();
    assert_eq!(
        clones,
        [
            ("Elena".to_string(), "Dante".to_string(), 1),
            ("Dante".to_string(), "Aria".to_string(), 2),
        ]
    );

    // Every end-of-round snapshot holds four living debaters splitting the
    // full 24 points, all back at neutral confidence after phase 3.
    let mut snapshots = 0;
    for event in &events {
        if let ArenaEvent::StateSnapshot { state, .. } = event {
            snapshots += 1;
            assert_eq!(state.agents.len(), 4, "round {}", state.round);
            assert_eq!(state.scores.values().sum::<i32>(), 24, "round {}", state.round);
            assert!(state.agents.iter().all(|agent| agent.confidence == 3));
        }
    }
    assert_eq!(snapshots, 4);

    let last_state = events
        .iter()
        .rev()
        .find_map(|event| match event {
            ArenaEvent::StateSnapshot { state, .. } => Some(state.clone()),
            _ => None,
        })
        .unwrap();
    let fallen: Vec<&str> = last_state
        .graveyard
        .iter()
        .map(|agent| agent.name.as_str())
        .collect();
    assert_eq!(fallen, ["Victor", "Marcus"]);
    assert!(last_state.graveyard.iter().all(|agent| !agent.alive));

    // Clone lineage: Dante inherits Elena's stance and carries her id.
    let elena = last_state
        .agents
        .iter()
        .find(|agent| agent.name == "Elena")
        .unwrap();
    let dante = last_state
        .agents
        .iter()
        .find(|agent| agent.name == "Dante")
        .unwrap();
    assert_eq!(dante.parent_id.as_deref(), Some(elena.id.as_str()));
    assert_eq!(dante.born_at_round, 2);
    assert_eq!(dante.stance, elena.stance);

    match events.last().unwrap() {
        ArenaEvent::GameEnd {
            survivors, rounds, ..
        } => {
            assert_eq!(survivors, &report.survivors);
            assert_eq!(rounds, &[1, 2, 3, 4]);
        }
        other => panic!("expected game_end last, got {}", other.event_type()),
    }
}

#[tokio::test]
async fn test_round_events_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = ArenaConfig::default()
        .with_max_rounds(2)
        .with_elimination_window(2);
    let (engine, bus) = rigged_game(dir.path(), config);
    spawn_feeder(&bus);

    let (_report, events) = run_collecting(engine, &bus).await;

    let awaiting_1 = index_of(&events, "awaiting round 1", |e| {
        matches!(e, ArenaEvent::AwaitingInput { round: 1, .. })
    });
    let start_1 = index_of(&events, "round 1 start", |e| {
        matches!(e, ArenaEvent::RoundStart { round: 1, .. })
    });
    let phase_1 = index_of(&events, "round 1 phase 1", |e| {
        matches!(e, ArenaEvent::PhaseStart { round: 1, phase: 1, .. })
    });
    let phase_4 = index_of(&events, "round 1 phase 4", |e| {
        matches!(e, ArenaEvent::PhaseStart { round: 1, phase: 4, .. })
    });
    let death_1 = index_of(&events, "round 1 death", |e| {
        matches!(e, ArenaEvent::Death { round: 1, .. })
    });
    let cloned_1 = index_of(&events, "round 1 clone", |e| {
        matches!(e, ArenaEvent::Cloned { round: 1, .. })
    });
    let snapshot_1 = index_of(&events, "round 1 snapshot", |e| {
        matches!(e, ArenaEvent::StateSnapshot { state, .. } if state.round == 1)
    });
    let awaiting_2 = index_of(&events, "awaiting round 2", |e| {
        matches!(e, ArenaEvent::AwaitingInput { round: 2, .. })
    });

    assert!(awaiting_1 < start_1);
    assert!(start_1 < phase_1);
    assert!(phase_1 < phase_4);
    assert!(phase_4 < death_1);
    assert!(death_1 < cloned_1);
    assert!(cloned_1 < snapshot_1);
    assert!(snapshot_1 < awaiting_2);

    // Phases 1 through 4 are announced exactly once per round, in order.
    let phases: Vec<(u32, u8)> = events
        .iter()
        .filter_map(|event| match event {
            ArenaEvent::PhaseStart { round, phase, .. } => Some((*round, *phase)),
            _ => None,
        })
        .collect();
    assert_eq!(phases, [(1, 1), (1, 2), (1, 3), (1, 4), (2, 1), (2, 2), (2, 3), (2, 4)]);
}

// ── Games that end before any round ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_input_timeout_ends_game_with_zero_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, bus) = rigged_game(dir.path(), ArenaConfig::default());
    let mut rx = bus.subscribe();

    // Nobody feeds a claim; the paused clock fast-forwards the wait.
    let report = engine.run().await;

    assert_eq!(report.rounds_completed, 0);
    assert_eq!(report.survivors, ["Marcus", "Elena", "Victor", "Luna"]);

    let mut saw_game_end = false;
    while let Ok(event) = rx.try_recv() {
        if let ArenaEvent::GameEnd {
            survivors, rounds, ..
        } = event
        {
            saw_game_end = true;
            assert_eq!(survivors, report.survivors);
            assert!(rounds.is_empty(), "no round ran to completion");
        }
    }
    assert!(saw_game_end);
}

#[tokio::test]
async fn test_closed_input_ends_game() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, bus) = rigged_game(dir.path(), ArenaConfig::default());

    bus.close_input();
    let report = engine.run().await;

    assert_eq!(report.rounds_completed, 0);
    assert_eq!(report.survivors.len(), 4);
}

#[tokio::test]
async fn test_blank_claim_ends_game() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, bus) = rigged_game(dir.path(), ArenaConfig::default());

    bus.submit_input("   ");
    let report = engine.run().await;

    assert_eq!(report.rounds_completed, 0);
    assert_eq!(report.survivors.len(), 4);
}
