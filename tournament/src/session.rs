//! Session state and its crash-safe store.
//!
//! A session is one tournament: four positional slots, the claim under
//! debate, the last completed round, and the graveyard of eliminated
//! participants. The store serializes all of it to one JSON snapshot per
//! session, written atomically (temp file + rename) so a crash never leaves
//! a half-written snapshot where a resume could find it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{initial_cohort, Agent};
use crate::events::AgentMessage;

/// Unique identifier for a session (UUID v4, string form).
pub type SessionId = String;

/// Snapshot format version; bumped on incompatible layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session state io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("no snapshot found for session {0}")]
    NotFound(SessionId),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One tournament instance.
///
/// The slot array is fixed at four entries; a slot is vacant only for the
/// instant between an elimination and the clone's installation, and in
/// snapshots taken of degenerate sessions. `round` is the last round that
/// ran to completion, 0 for a fresh session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,

    /// Claim debated in the current round.
    pub claim: String,

    /// The four positional participant slots.
    pub slots: [Option<Agent>; 4],

    /// Last completed round; 0 before any round finished.
    pub round: u32,

    /// Eliminated participants, oldest death first.
    pub graveyard: Vec<Agent>,
}

impl Session {
    /// Create a fresh session seeded with the initial cohort.
    pub fn new(id: impl Into<SessionId>, claim: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claim: claim.into(),
            slots: initial_cohort().map(Some),
            round: 0,
            graveyard: Vec::new(),
        }
    }

    /// Living participants in slot order.
    pub fn living(&self) -> impl Iterator<Item = &Agent> {
        self.slots.iter().flatten().filter(|agent| agent.alive)
    }

    /// Number of living participants.
    pub fn living_count(&self) -> usize {
        self.living().count()
    }

    /// Names of the living participants, in slot order.
    pub fn survivor_names(&self) -> Vec<String> {
        self.living().map(|agent| agent.name.clone()).collect()
    }

    /// Look up a living or dead slot occupant by id.
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.slots
            .iter()
            .flatten()
            .find(|agent| agent.id == id)
    }

    /// Mutable lookup by id.
    pub fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|agent| agent.id == id)
    }

    /// Every display name ever used in this session, alive or dead.
    pub fn used_names(&self) -> HashSet<String> {
        self.slots
            .iter()
            .flatten()
            .map(|agent| agent.name.clone())
            .chain(self.graveyard.iter().map(|agent| agent.name.clone()))
            .collect()
    }

    /// Eliminate the participant holding `id`.
    ///
    /// The slot becomes vacant, the participant's death fields are stamped,
    /// and ownership moves to the graveyard. Returns the freed slot index so
    /// the replacement lands in the same position, or `None` when no slot
    /// holds `id`.
    pub fn eliminate(&mut self, id: &str, round: u32) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|agent| agent.id == id))?;

        let mut agent = self.slots[index].take()?;
        agent.mark_eliminated(round);
        self.graveyard.push(agent);
        Some(index)
    }

    /// Install a participant into a freed slot, preserving position.
    pub fn install(&mut self, index: usize, agent: Agent) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(agent);
        }
    }

    /// Derived context line for round-start events: prior eliminations and
    /// the names still competing.
    pub fn round_context(&self) -> String {
        let mut parts: Vec<String> = self
            .graveyard
            .iter()
            .map(|dead| format!("{} was eliminated in round {}.", dead.name, dead.died_at_round))
            .collect();

        let competing = self.survivor_names();
        if !competing.is_empty() {
            parts.push(format!("Now competing: {}", competing.join(", ")));
        }

        parts.join("\n")
    }
}

/// Point-in-time serialization of a [`Session`].
///
/// All four slots are kept, vacant ones included, so a resumed session can
/// never misalign participant identity with slot position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version for forward-compat checks.
    pub version: u32,

    /// Session identifier.
    pub session_id: SessionId,

    /// Claim of the most recent round.
    pub claim: String,

    /// Last completed round.
    pub round: u32,

    /// All four slots, positionally.
    pub slots: [Option<Agent>; 4],

    /// Eliminated participants.
    pub graveyard: Vec<Agent>,

    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture a session.
    pub fn from_session(session: &Session) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id: session.id.clone(),
            claim: session.claim.clone(),
            round: session.round,
            slots: session.slots.clone(),
            graveyard: session.graveyard.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Rebuild the session this snapshot captured.
    pub fn into_session(self) -> Session {
        Session {
            id: self.session_id,
            claim: self.claim,
            slots: self.slots,
            round: self.round,
            graveyard: self.graveyard,
        }
    }
}

/// Durable per-participant record of one completed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round the record covers.
    pub round: u32,

    /// Claim that was debated.
    pub claim: String,

    /// Phase 1 output, if the participant produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AgentMessage>,

    /// Phase 2 output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<AgentMessage>,

    /// Phase 3 output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<AgentMessage>,

    /// Phase 4 output (the ranking the participant cast).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking: Option<AgentMessage>,

    /// Points earned from peers this round.
    pub points: i32,

    /// Times ranked first this round.
    pub first_places: u32,

    /// How the peers ranked this participant, by voter name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub ranked_by: HashMap<String, i32>,
}

/// Filesystem-backed store for sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory holding one session's state.
    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join("sessions").join(id)
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("state.json")
    }

    /// Create a session: directory skeleton, initial cohort, first snapshot.
    pub fn create(&self, id: &str, claim: &str) -> StoreResult<Session> {
        let dir = self.session_dir(id);
        std::fs::create_dir_all(dir.join("agents"))?;

        let session = Session::new(id, claim);
        self.save(&session)?;
        Ok(session)
    }

    /// Load the latest snapshot of a session.
    pub fn load(&self, id: &str) -> StoreResult<Session> {
        let path = self.state_path(id);
        let data = std::fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(id.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        let snapshot: Snapshot =
            serde_json::from_str(&data).map_err(|err| StoreError::Corrupt(err.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        Ok(snapshot.into_session())
    }

    /// Load an existing session or create a fresh one.
    ///
    /// The flag reports which path was taken: `true` means the session was
    /// resumed from a snapshot, so play continues after its recorded round.
    pub fn get_or_create(&self, id: &str) -> StoreResult<(Session, bool)> {
        if self.state_path(id).exists() {
            let session = self.load(id)?;
            return Ok((session, true));
        }
        let session = self.create(id, "")?;
        Ok((session, false))
    }

    /// Persist a session snapshot atomically.
    ///
    /// The snapshot is written to `state.json.tmp` and renamed over
    /// `state.json`, so concurrent readers only ever observe a complete
    /// snapshot.
    pub fn save(&self, session: &Session) -> StoreResult<()> {
        let dir = self.session_dir(&session.id);
        std::fs::create_dir_all(&dir)?;

        let snapshot = Snapshot::from_session(session);
        let data = serde_json::to_string_pretty(&snapshot)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let tmp_path = dir.join("state.json.tmp");
        let final_path = dir.join("state.json");

        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &final_path)?;

        debug!(session_id = %session.id, round = session.round, "Snapshot saved");
        Ok(())
    }

    /// Write one participant's durable record for a completed round.
    pub fn write_round_record(
        &self,
        session_id: &str,
        agent_name: &str,
        record: &RoundRecord,
    ) -> StoreResult<()> {
        let dir = self.session_dir(session_id).join("agents").join(agent_name);
        std::fs::create_dir_all(&dir)?;

        let data = serde_json::to_string_pretty(record)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        std::fs::write(dir.join(format!("round_{}.json", record.round)), data)?;
        Ok(())
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
