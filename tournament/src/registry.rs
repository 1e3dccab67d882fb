//! Session ownership registry.
//!
//! At most one engine may drive a session at a time. The registry hands out
//! RAII guards: registering a session id that already holds a guard is
//! rejected, and dropping the guard releases the id even when the game task
//! panics. The lock is scoped to register and release only; no game work
//! ever runs under it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::session::SessionId;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} already has a running game")]
    AlreadyRunning(SessionId),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Tracks which sessions currently have a running game.
#[derive(Debug, Default)]
pub struct GameRegistry {
    active: Mutex<HashSet<SessionId>>,
}

impl GameRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a session for a new game.
    ///
    /// The returned guard holds the claim; drop it when the game is over.
    pub fn register(self: &Arc<Self>, session_id: &str) -> RegistryResult<GameGuard> {
        let mut active = self.active();
        if !active.insert(session_id.to_string()) {
            return Err(RegistryError::AlreadyRunning(session_id.to_string()));
        }
        debug!(session_id, games = active.len(), "Session registered");
        Ok(GameGuard {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
        })
    }

    /// Whether a session currently has a running game.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active().contains(session_id)
    }

    /// Number of currently running games.
    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    fn release(&self, session_id: &str) {
        let mut active = self.active();
        if active.remove(session_id) {
            debug!(session_id, games = active.len(), "Session released");
        }
    }

    fn active(&self) -> MutexGuard<'_, HashSet<SessionId>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("registry lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// RAII claim on a session id. Dropping it releases the session.
#[derive(Debug)]
pub struct GameGuard {
    registry: Arc<GameRegistry>,
    session_id: SessionId,
}

impl GameGuard {
    /// The session this guard claims.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for GameGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session_id);
    }
}
