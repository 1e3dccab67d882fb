//! The four debate phases, fanned out across the living participants.
//!
//! ```text
//! Phase 1: Assessment   {confidence, reasoning}      structured reply
//! Phase 2: Statement    free text                    public argument
//! Phase 3: Revision     {confidence, final_take}     reads the shared transcript
//! Phase 4: Ranking      {rankings, revised_stance}   votes on the other three
//! ```
//!
//! Each phase spawns one task per living participant into a [`JoinSet`] and
//! blocks until every task has reported back. Tasks never touch shared
//! state: they return their message, and the single-threaded join loop
//! applies confidence and stance updates, so phase output cannot race.
//!
//! ## Partial failure policy
//!
//! A task that times out, fails transport, or replies garbage does not sink
//! the phase. Phases 1 through 3 substitute a fixed fallback message so the
//! round keeps its full quorum; phase 4 treats failure as an abstention and
//! the voter simply casts no ballot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::agent::{stance_label, Agent, AgentId};
use crate::completion::{complete_structured, extract_json, Completion, CompletionError};
use crate::events::{AgentMessage, AgentState, ArenaEvent, PeerRank, SharedArenaBus};
use crate::session::Session;

/// Stand-in reasoning when phase 1 produces nothing usable.
pub const ASSESSMENT_FALLBACK: &str = "Unable to assess this claim.";

/// Stand-in statement when phase 2 produces nothing usable.
pub const STATEMENT_FALLBACK: &str = "I maintain my position.";

/// Stand-in final take when phase 3 produces nothing usable.
pub const REVISION_FALLBACK: &str = "I maintain my original position.";

#[derive(Deserialize)]
struct AssessmentResponse {
    confidence: i32,
    reasoning: String,
}

#[derive(Deserialize)]
struct RevisionResponse {
    confidence: i32,
    final_take: String,
    /// Reported but not acted on; the confidence delta is what counts.
    #[serde(default)]
    #[allow(dead_code)]
    revised: bool,
}

#[derive(Deserialize)]
struct RankingResponse {
    #[serde(default)]
    rankings: Vec<RankingEntry>,
    #[serde(default)]
    revised_stance: Option<f64>,
}

#[derive(Deserialize)]
struct RankingEntry {
    name: String,
    rank: i32,
}

/// Owned per-task view of one participant, captured before the fan-out.
#[derive(Clone)]
struct Turn {
    id: AgentId,
    name: String,
    stance: f64,
    volatility: f64,
    confidence: i32,
    role: String,
}

/// Runs one phase at a time across the cohort.
pub struct PhaseRunner {
    completion: Arc<dyn Completion>,
    bus: SharedArenaBus,
    call_timeout: Duration,
}

impl PhaseRunner {
    pub fn new(
        completion: Arc<dyn Completion>,
        bus: SharedArenaBus,
        call_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            bus,
            call_timeout,
        }
    }

    /// Phase 1: every participant privately sizes up the claim.
    ///
    /// Successful replies update the participant's confidence (clamped);
    /// failures fall back to a neutral message carrying the confidence the
    /// participant already had.
    pub async fn run_assessment(
        &self,
        session: &mut Session,
        round: u32,
    ) -> HashMap<AgentId, AgentMessage> {
        let mut join_set = JoinSet::new();

        for agent in session.living() {
            let turn = self.turn_for(agent, session, round);
            let task = format!(
                "Claim under debate: \"{}\"\n\n\
                 Assess it through your {} outlook (stance {:.2}). Confidence 1-5.\n\n\
                 JSON only, reasoning SHORT (50 words max):\n\
                 {{ \"confidence\": N, \"reasoning\": \"...\" }}",
                session.claim,
                stance_label(turn.stance),
                turn.stance,
            );
            self.spawn_assessment(&mut join_set, turn, task, round, session.id.clone());
        }

        let mut responses = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((agent_id, message)) => {
                    if let Some(confidence) = message.confidence {
                        if let Some(agent) = session.agent_mut(&agent_id) {
                            agent.set_confidence(confidence);
                        }
                    }
                    self.publish_output(&session.id, &message);
                    responses.insert(agent_id, message);
                }
                Err(err) => warn!(error = %err, "assessment worker panicked"),
            }
        }
        responses
    }

    fn spawn_assessment(
        &self,
        join_set: &mut JoinSet<(AgentId, AgentMessage)>,
        turn: Turn,
        task: String,
        round: u32,
        session_id: String,
    ) {
        let completion = Arc::clone(&self.completion);
        let bus = Arc::clone(&self.bus);
        let call_timeout = self.call_timeout;

        join_set.spawn(async move {
            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Thinking,
                "Phase 1: initial assessment",
            );

            let call = complete_structured::<AssessmentResponse>(
                completion.as_ref(),
                &turn.role,
                &task,
                turn.volatility,
                call_timeout,
            );
            let result = match tokio::time::timeout(call_timeout, call).await {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(call_timeout)),
            };

            let message = match result {
                Ok(parsed) => {
                    AgentMessage::new(&turn.id, &turn.name, round, 1, parsed.reasoning)
                        .with_confidence(parsed.confidence)
                }
                Err(err) => {
                    warn!(agent = %turn.name, error = %err, "phase 1 failed, using fallback");
                    AgentMessage::new(&turn.id, &turn.name, round, 1, ASSESSMENT_FALLBACK)
                        .with_confidence(turn.confidence)
                }
            };

            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Done,
                "Phase 1 complete",
            );
            (turn.id, message)
        });
    }

    /// Phase 2: every participant argues its position to the others.
    ///
    /// Free text, no state change. A failed call falls back to a terse
    /// holding statement so the transcript stays complete.
    pub async fn run_statement(
        &self,
        session: &Session,
        round: u32,
        assessments: &HashMap<AgentId, AgentMessage>,
    ) -> HashMap<AgentId, AgentMessage> {
        let mut join_set = JoinSet::new();

        for agent in session.living() {
            let turn = self.turn_for(agent, session, round);
            let (confidence, reasoning) = match assessments.get(&turn.id) {
                Some(assessment) => (
                    assessment.confidence.unwrap_or(turn.confidence),
                    assessment.content.clone(),
                ),
                None => (turn.confidence, String::new()),
            };
            let task = format!(
                "Your position on the claim \"{}\":\n\
                 - Confidence: {}/5\n\
                 - Reasoning: {}\n\n\
                 You must win over 3 other debaters. Write a SHORT argument (100 words max), \
                 punchy, consistent with your {} outlook.\n\n\
                 Be concise and persuasive!",
                session.claim,
                confidence,
                reasoning,
                stance_label(turn.stance),
            );
            self.spawn_statement(&mut join_set, turn, task, round, session.id.clone());
        }

        let mut responses = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((agent_id, message)) => {
                    self.publish_output(&session.id, &message);
                    responses.insert(agent_id, message);
                }
                Err(err) => warn!(error = %err, "statement worker panicked"),
            }
        }
        responses
    }

    fn spawn_statement(
        &self,
        join_set: &mut JoinSet<(AgentId, AgentMessage)>,
        turn: Turn,
        task: String,
        round: u32,
        session_id: String,
    ) {
        let completion = Arc::clone(&self.completion);
        let bus = Arc::clone(&self.bus);
        let call_timeout = self.call_timeout;

        join_set.spawn(async move {
            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Thinking,
                "Phase 2: public statement",
            );

            let call = completion.complete(&turn.role, &task, turn.volatility, call_timeout);
            let result = match tokio::time::timeout(call_timeout, call).await {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(call_timeout)),
            };

            let message = match result {
                Ok(content) => AgentMessage::new(&turn.id, &turn.name, round, 2, content),
                Err(err) => {
                    warn!(agent = %turn.name, error = %err, "phase 2 failed, using fallback");
                    AgentMessage::new(&turn.id, &turn.name, round, 2, STATEMENT_FALLBACK)
                }
            };

            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Done,
                "Phase 2 complete",
            );
            (turn.id, message)
        });
    }

    /// Phase 3: everyone rereads the full debate and revises, or keeps,
    /// their confidence.
    pub async fn run_revision(
        &self,
        session: &mut Session,
        round: u32,
        statements: &HashMap<AgentId, AgentMessage>,
    ) -> HashMap<AgentId, AgentMessage> {
        let transcript = debate_transcript(session, statements);
        let mut join_set = JoinSet::new();

        for agent in session.living() {
            let turn = self.turn_for(agent, session, round);
            let task = format!(
                "Debate on \"{}\":\n\n{}\n\n\
                 Your confidence going in: {}/5.\n\n\
                 Revise (or keep) your confidence after reading. Reply SHORT (80 words max).\n\n\
                 JSON only:\n\
                 {{ \"confidence\": N, \"final_take\": \"...\", \"revised\": true/false }}",
                session.claim, transcript, turn.confidence,
            );
            self.spawn_revision(&mut join_set, turn, task, round, session.id.clone());
        }

        let mut responses = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((agent_id, message)) => {
                    if let Some(confidence) = message.confidence {
                        if let Some(agent) = session.agent_mut(&agent_id) {
                            agent.set_confidence(confidence);
                        }
                    }
                    self.publish_output(&session.id, &message);
                    responses.insert(agent_id, message);
                }
                Err(err) => warn!(error = %err, "revision worker panicked"),
            }
        }
        responses
    }

    fn spawn_revision(
        &self,
        join_set: &mut JoinSet<(AgentId, AgentMessage)>,
        turn: Turn,
        task: String,
        round: u32,
        session_id: String,
    ) {
        let completion = Arc::clone(&self.completion);
        let bus = Arc::clone(&self.bus);
        let call_timeout = self.call_timeout;

        join_set.spawn(async move {
            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Thinking,
                "Phase 3: revision",
            );

            let call = complete_structured::<RevisionResponse>(
                completion.as_ref(),
                &turn.role,
                &task,
                turn.volatility,
                call_timeout,
            );
            let result = match tokio::time::timeout(call_timeout, call).await {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(call_timeout)),
            };

            let message = match result {
                Ok(parsed) => {
                    AgentMessage::new(&turn.id, &turn.name, round, 3, parsed.final_take)
                        .with_confidence(parsed.confidence)
                }
                Err(err) => {
                    warn!(agent = %turn.name, error = %err, "phase 3 failed, using fallback");
                    AgentMessage::new(&turn.id, &turn.name, round, 3, REVISION_FALLBACK)
                        .with_confidence(turn.confidence)
                }
            };

            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Done,
                "Phase 3 complete",
            );
            (turn.id, message)
        });
    }

    /// Phase 4: every participant ranks the three others.
    ///
    /// The reply must name the other participants; names are matched
    /// case-insensitively and entries naming nobody are dropped. A failed
    /// call or unparseable reply is an abstention and produces no ballot.
    /// A well-formed revised stance inside [0, 1] is applied to the voter.
    pub async fn run_ranking(
        &self,
        session: &mut Session,
        round: u32,
        statements: &HashMap<AgentId, AgentMessage>,
        revisions: &HashMap<AgentId, AgentMessage>,
    ) -> HashMap<AgentId, AgentMessage> {
        let opening_takes = debate_transcript(session, statements);
        let final_takes = annotated_transcript(session, revisions);
        let mut join_set = JoinSet::new();

        for agent in session.living() {
            let turn = self.turn_for(agent, session, round);
            let others: Vec<(AgentId, String)> = session
                .living()
                .filter(|other| other.id != turn.id)
                .map(|other| (other.id.clone(), other.name.clone()))
                .collect();
            let other_names: Vec<&str> = others.iter().map(|(_, name)| name.as_str()).collect();

            let task = format!(
                "Here is the full debate on the claim \"{}\":\n\n\
                 **Opening statements:**\n{}\n\n\
                 **Final takes:**\n{}\n\n\
                 Rank the 3 OTHER debaters ({}) from most convincing (rank=1) to least \
                 convincing (rank=3).\n\
                 DO NOT RANK YOURSELF.\n\n\
                 Did the debate move you? If so, revise your stance \
                 (0.0 = far right, 1.0 = far left).\n\
                 Your current stance: {:.2}\n\n\
                 Reply ONLY with valid JSON:\n\
                 {{ \"rankings\": [{{\"name\":\"NAME\",\"rank\":1}}, {{\"name\":\"NAME\",\"rank\":2}}, \
                 {{\"name\":\"NAME\",\"rank\":3}}], \"revised_stance\": 0.XX }}",
                session.claim,
                opening_takes,
                final_takes,
                other_names.join(", "),
                turn.stance,
            );
            self.spawn_ranking(&mut join_set, turn, task, round, session.id.clone(), others);
        }

        let mut ballots = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((agent_id, Some(message))) => {
                    if let Some(stance) = message.revised_stance {
                        if let Some(agent) = session.agent_mut(&agent_id) {
                            if !agent.revise_stance(stance) {
                                debug!(
                                    agent = %agent.name,
                                    stance,
                                    "ignoring out-of-range revised stance"
                                );
                            }
                        }
                    }
                    self.publish_output(&session.id, &message);
                    ballots.insert(agent_id, message);
                }
                Ok((agent_id, None)) => {
                    debug!(agent_id = %agent_id, "no ballot cast this round");
                }
                Err(err) => warn!(error = %err, "ranking worker panicked"),
            }
        }
        ballots
    }

    fn spawn_ranking(
        &self,
        join_set: &mut JoinSet<(AgentId, Option<AgentMessage>)>,
        turn: Turn,
        task: String,
        round: u32,
        session_id: String,
        others: Vec<(AgentId, String)>,
    ) {
        let completion = Arc::clone(&self.completion);
        let bus = Arc::clone(&self.bus);
        let call_timeout = self.call_timeout;

        join_set.spawn(async move {
            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Thinking,
                "Phase 4: peer ranking",
            );

            let call = completion.complete(&turn.role, &task, turn.volatility, call_timeout);
            let result = match tokio::time::timeout(call_timeout, call).await {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(call_timeout)),
            };

            let message = match result {
                Ok(raw) => parse_ballot(&turn, round, raw, &others),
                Err(err) => {
                    warn!(agent = %turn.name, error = %err, "phase 4 failed, abstaining");
                    None
                }
            };

            publish_status(
                &bus,
                &session_id,
                &turn.id,
                AgentState::Done,
                "Phase 4 complete",
            );
            (turn.id, message)
        });
    }

    /// Identity and framing the participant argues from, rebuilt each phase
    /// so confidence and the elimination history stay current.
    fn turn_for(&self, agent: &Agent, session: &Session, round: u32) -> Turn {
        let mut role = format!(
            "You are {}, a debater with a {} outlook.\n\
             Your stance sits at {:.2} on a 0.0 (far right) to 1.0 (far left) axis; argue from it.\n\
             Volatility {:.2} sets how hot-headed your style runs. Current confidence: {}/5.\n\
             This is round {} of an elimination tournament; the least convincing debater \
             each round is voted out.",
            agent.name,
            stance_label(agent.stance),
            agent.stance,
            agent.volatility,
            agent.confidence,
            round,
        );
        let context = session.round_context();
        if !context.is_empty() {
            role.push('\n');
            role.push_str(&context);
        }

        Turn {
            id: agent.id.clone(),
            name: agent.name.clone(),
            stance: agent.stance,
            volatility: agent.volatility,
            confidence: agent.confidence,
            role,
        }
    }

    fn publish_output(&self, session_id: &str, message: &AgentMessage) {
        self.bus.publish(ArenaEvent::AgentOutput {
            session_id: session_id.to_string(),
            message: message.clone(),
            timestamp: Utc::now(),
        });
    }
}

/// Parse a raw ranking reply into a ballot, or abstain.
///
/// The ballot keeps the raw reply as content. Ranking entries are resolved
/// against the other participants by trimmed, case-insensitive name;
/// entries that resolve to nobody are dropped.
fn parse_ballot(
    turn: &Turn,
    round: u32,
    raw: String,
    others: &[(AgentId, String)],
) -> Option<AgentMessage> {
    let parsed: RankingResponse = match serde_json::from_str(extract_json(&raw)) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(agent = %turn.name, error = %err, "phase 4 reply unparseable, abstaining");
            return None;
        }
    };

    let mut rankings = Vec::new();
    for entry in parsed.rankings {
        let wanted = entry.name.trim().to_lowercase();
        match others.iter().find(|(_, name)| name.to_lowercase() == wanted) {
            Some((other_id, _)) => rankings.push(PeerRank {
                agent_id: other_id.clone(),
                rank: entry.rank,
            }),
            None => warn!(
                agent = %turn.name,
                target = %entry.name,
                "ranking names an unknown debater, dropping entry"
            ),
        }
    }

    let mut message =
        AgentMessage::new(&turn.id, &turn.name, round, 4, raw).with_rankings(rankings);
    if let Some(stance) = parsed.revised_stance {
        message = message.with_revised_stance(stance);
    }
    Some(message)
}

/// Slot-ordered transcript of one phase's messages.
fn debate_transcript(session: &Session, messages: &HashMap<AgentId, AgentMessage>) -> String {
    session
        .living()
        .filter_map(|agent| messages.get(&agent.id))
        .map(|message| format!("**{}**:\n{}", message.agent_name, message.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Like [`debate_transcript`] but tagging each entry with the author's
/// reported confidence, for the voting phase.
fn annotated_transcript(session: &Session, messages: &HashMap<AgentId, AgentMessage>) -> String {
    session
        .living()
        .filter_map(|agent| messages.get(&agent.id).map(|message| (agent, message)))
        .map(|(agent, message)| {
            format!(
                "**{}** (confidence {}/5):\n{}",
                message.agent_name,
                message.confidence.unwrap_or(agent.confidence),
                message.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn publish_status(
    bus: &SharedArenaBus,
    session_id: &str,
    agent_id: &str,
    state: AgentState,
    detail: &str,
) {
    bus.publish(ArenaEvent::AgentStatus {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        state,
        detail: detail.to_string(),
        timestamp: Utc::now(),
    });
}
