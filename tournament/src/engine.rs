//! The game loop.
//!
//! One engine owns one session and drives it round by round: wait for the
//! claim, run the four phases, score the ballots, eliminate and clone, then
//! persist. A round that receives no claim before the input window lapses
//! ends the game; so does a closed input channel or an empty claim.
//!
//! Persistence failures are logged and skipped rather than propagated. A
//! full disk stops snapshots, not the game; the session keeps playing from
//! memory and the event stream stays live.

use std::collections::HashMap;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentId};
use crate::config::ArenaConfig;
use crate::events::{AgentMessage, ArenaEvent, GlobalState, InputReceiver, SharedArenaBus};
use crate::phase::PhaseRunner;
use crate::scoring::{self, ScoreCard};
use crate::session::{RoundRecord, Session, SessionId, SessionStore};
use crate::stage::{RoundStage, StageMachine};

/// Final report of a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    /// Session the report belongs to.
    pub session_id: SessionId,
    /// Names of the participants alive when the game ended.
    pub survivors: Vec<String>,
    /// Number of rounds that ran to completion.
    pub rounds_completed: u32,
}

/// Everything a living participant produced in one round, keyed by id.
struct RoundOutputs {
    assessments: HashMap<AgentId, AgentMessage>,
    statements: HashMap<AgentId, AgentMessage>,
    revisions: HashMap<AgentId, AgentMessage>,
    ballots: HashMap<AgentId, AgentMessage>,
}

/// Drives one session from its current round to the end of the game.
pub struct GameEngine {
    session: Session,
    store: SessionStore,
    runner: PhaseRunner,
    bus: SharedArenaBus,
    input: InputReceiver,
    config: ArenaConfig,
    stages: StageMachine,
    rng: Box<dyn RngCore + Send>,
}

impl GameEngine {
    pub fn new(
        session: Session,
        store: SessionStore,
        runner: PhaseRunner,
        bus: SharedArenaBus,
        input: InputReceiver,
        config: ArenaConfig,
    ) -> Self {
        Self {
            session,
            store,
            runner,
            bus,
            input,
            config,
            stages: StageMachine::new(),
            rng: Box::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the draw source used for tie breaking.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Run the game to completion and report the outcome.
    ///
    /// A resumed session picks up at the round after its last completed one.
    pub async fn run(mut self) -> GameReport {
        let first_round = self.session.round + 1;
        info!(
            session_id = %self.session.id,
            first_round,
            max_rounds = self.config.max_rounds,
            participants = self.session.living_count(),
            "Game loop starting"
        );

        let mut end_reason = "max rounds reached";
        for round in first_round..=self.config.max_rounds {
            if self.stages.current() != RoundStage::AwaitingClaim {
                self.enter(RoundStage::AwaitingClaim, None);
            }
            self.stages.set_round(round);
            self.bus.publish(ArenaEvent::AwaitingInput {
                session_id: self.session.id.clone(),
                round,
                timestamp: Utc::now(),
            });

            let claim =
                match tokio::time::timeout(self.config.input_timeout(), self.input.recv()).await {
                    Ok(Ok(claim)) => claim,
                    Ok(Err(_)) => {
                        info!(round, "input channel closed, ending game");
                        end_reason = "input closed";
                        break;
                    }
                    Err(_) => {
                        info!(
                            round,
                            timeout_secs = self.config.input_timeout_secs,
                            "no claim submitted in time, ending game"
                        );
                        end_reason = "input timeout";
                        break;
                    }
                };
            if claim.trim().is_empty() {
                info!(round, "empty claim submitted, ending game");
                end_reason = "empty claim";
                break;
            }

            self.session.claim = claim;
            self.play_round(round).await;
        }

        self.finish(end_reason)
    }

    /// Run the four phases of one round and resolve it.
    async fn play_round(&mut self, round: u32) {
        info!(
            session_id = %self.session.id,
            round,
            claim = %self.session.claim,
            "Round starting"
        );

        // Everyone alive now gets a durable record for this round, the
        // round's loser included.
        let roster: Vec<(AgentId, String)> = self
            .session
            .living()
            .map(|agent| (agent.id.clone(), agent.name.clone()))
            .collect();

        self.bus.publish(ArenaEvent::RoundStart {
            session_id: self.session.id.clone(),
            round,
            claim: self.session.claim.clone(),
            context: self.session.round_context(),
            timestamp: Utc::now(),
        });

        self.begin_phase(RoundStage::Assessment, round);
        let assessments = self.runner.run_assessment(&mut self.session, round).await;

        self.begin_phase(RoundStage::Statement, round);
        let statements = self
            .runner
            .run_statement(&self.session, round, &assessments)
            .await;

        self.begin_phase(RoundStage::Revision, round);
        let revisions = self
            .runner
            .run_revision(&mut self.session, round, &statements)
            .await;

        self.begin_phase(RoundStage::Ranking, round);
        let ballots = self
            .runner
            .run_ranking(&mut self.session, round, &statements, &revisions)
            .await;

        let outputs = RoundOutputs {
            assessments,
            statements,
            revisions,
            ballots,
        };

        self.enter(RoundStage::Resolution, None);
        let scores = scoring::compute_scores(&outputs.ballots, self.session.living());
        info!(
            round,
            scores = %scoring::score_summary(&scores, self.session.living()),
            "Round scored"
        );

        if self.config.in_elimination_window(round) && !scores.is_empty() {
            self.resolve_elimination(round, &scores);
        } else {
            debug!(round, "no elimination this round");
        }

        self.write_round_records(round, &roster, &outputs, &scores);

        self.session.round = round;
        if let Err(err) = self.store.save(&self.session) {
            warn!(error = %err, "failed to persist session, continuing in memory");
        }

        self.publish_state(round, &scores);
        self.enter(RoundStage::RoundComplete, None);
    }

    /// Eliminate the round's loser and install a clone of its winner.
    fn resolve_elimination(&mut self, round: u32, scores: &HashMap<AgentId, ScoreCard>) {
        let loser_id = scoring::select_loser(scores, &mut self.rng);
        let winner_id = scoring::select_winner(scores, &mut self.rng);
        let (Some(loser_id), Some(winner_id)) = (loser_id, winner_id) else {
            return;
        };

        // Read both before mutating anything: with a four-way tie the winner
        // can be the same participant that is about to be eliminated.
        let Some(winner) = self.session.agent(&winner_id).cloned() else {
            warn!(agent_id = %winner_id, "selected winner holds no slot");
            return;
        };
        let Some(loser) = self.session.agent(&loser_id).cloned() else {
            warn!(agent_id = %loser_id, "selected loser holds no slot");
            return;
        };

        info!(
            round,
            loser = %loser.name,
            winner = %winner.name,
            "Elimination resolved"
        );

        let Some(index) = self.session.eliminate(&loser.id, round) else {
            warn!(agent_id = %loser.id, "elimination failed, slots unchanged");
            return;
        };
        let cause = self
            .session
            .graveyard
            .last()
            .and_then(|dead| dead.death_cause.clone())
            .unwrap_or_default();
        self.bus.publish(ArenaEvent::Death {
            session_id: self.session.id.clone(),
            agent_id: loser.id.clone(),
            agent_name: loser.name.clone(),
            round,
            cause,
            timestamp: Utc::now(),
        });

        let child = Agent::clone_of(&winner, round, &self.session.used_names());
        info!(parent = %winner.name, child = %child.name, "Winner cloned into freed slot");
        let child_id = child.id.clone();
        let child_name = child.name.clone();
        self.session.install(index, child);
        self.bus.publish(ArenaEvent::Cloned {
            session_id: self.session.id.clone(),
            parent_id: winner.id.clone(),
            parent_name: winner.name.clone(),
            child_id,
            child_name,
            round,
            timestamp: Utc::now(),
        });
    }

    /// Write one durable record per roster member for this round.
    fn write_round_records(
        &self,
        round: u32,
        roster: &[(AgentId, String)],
        outputs: &RoundOutputs,
        scores: &HashMap<AgentId, ScoreCard>,
    ) {
        for (agent_id, agent_name) in roster {
            let card = scores.get(agent_id);
            let record = RoundRecord {
                round,
                claim: self.session.claim.clone(),
                assessment: outputs.assessments.get(agent_id).cloned(),
                statement: outputs.statements.get(agent_id).cloned(),
                revision: outputs.revisions.get(agent_id).cloned(),
                ranking: outputs.ballots.get(agent_id).cloned(),
                points: card.map_or(0, |c| c.total_points),
                first_places: card.map_or(0, |c| c.first_places),
                ranked_by: scoring::rankings_for(&outputs.ballots, agent_id, roster),
            };
            if let Err(err) = self
                .store
                .write_round_record(&self.session.id, agent_name, &record)
            {
                warn!(agent = %agent_name, error = %err, "failed to write round record");
            }
        }
    }

    /// Advance the stage machine and announce the phase.
    fn begin_phase(&mut self, stage: RoundStage, round: u32) {
        self.enter(stage, None);
        if let Some(phase) = stage.phase_number() {
            self.bus.publish(ArenaEvent::PhaseStart {
                session_id: self.session.id.clone(),
                round,
                phase,
                timestamp: Utc::now(),
            });
        }
    }

    /// Advance the stage machine, logging any rejected transition.
    fn enter(&mut self, to: RoundStage, reason: Option<&str>) {
        if let Err(err) = self.stages.advance(to, reason) {
            warn!(error = %err, "stage transition rejected");
        }
    }

    /// Publish the end-of-round snapshot of the whole session.
    fn publish_state(&self, round: u32, scores: &HashMap<AgentId, ScoreCard>) {
        let state = GlobalState {
            session_id: self.session.id.clone(),
            claim: self.session.claim.clone(),
            round,
            phase: 4,
            agents: self.session.living().cloned().collect(),
            graveyard: self.session.graveyard.clone(),
            scores: scores
                .iter()
                .map(|(id, card)| (id.clone(), card.total_points))
                .collect(),
        };
        self.bus.publish(ArenaEvent::StateSnapshot {
            session_id: self.session.id.clone(),
            state,
            timestamp: Utc::now(),
        });
    }

    /// Close out the game: final stage, end event, report.
    fn finish(mut self, reason: &str) -> GameReport {
        if let Err(err) = self.stages.end(reason) {
            warn!(error = %err, "stage transition rejected");
        }

        let survivors = self.session.survivor_names();
        let rounds: Vec<u32> = (1..=self.session.round).collect();
        info!(
            session_id = %self.session.id,
            reason,
            survivors = ?survivors,
            rounds_completed = self.session.round,
            stages = %self.stages.summary(),
            "Game over"
        );
        self.bus.publish(ArenaEvent::GameEnd {
            session_id: self.session.id.clone(),
            survivors: survivors.clone(),
            rounds,
            timestamp: Utc::now(),
        });

        GameReport {
            session_id: self.session.id.clone(),
            survivors,
            rounds_completed: self.session.round,
        }
    }
}
