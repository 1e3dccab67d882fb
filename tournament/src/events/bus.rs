//! In-process event transport for one or more games.
//!
//! Outbound events ride a Tokio broadcast channel: publishing is
//! fire-and-forget and tolerates having no subscribers. Inbound round claims
//! ride a watch channel, which is exactly the bounded single-slot mailbox the
//! engine needs: a new claim overwrites an unconsumed one without ever
//! blocking the submitter, and the engine only ever sees the most recent
//! pending claim.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::types::ArenaEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Error type for the inbound claim channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("round input channel closed")]
    InputClosed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Shared reference to an [`ArenaBus`].
pub type SharedArenaBus = Arc<ArenaBus>;

/// State of the single inbound claim slot.
#[derive(Debug, Clone)]
enum InputSlot {
    /// Nothing submitted yet.
    Empty,
    /// The most recent unconsumed claim.
    Claim(String),
    /// The submitter is gone; no further claims will arrive.
    Closed,
}

/// Event transport for one session.
pub struct ArenaBus {
    sender: broadcast::Sender<ArenaEvent>,
    input: watch::Sender<InputSlot>,
}

impl ArenaBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (input, _) = watch::channel(InputSlot::Empty);
        Self { sender, input }
    }

    /// Create a shared reference to this bus.
    pub fn shared(self) -> SharedArenaBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: ArenaEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.sender.subscribe()
    }

    /// Number of current event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Submit a round claim, overwriting any unconsumed one.
    ///
    /// Never blocks and never fails: if the engine has not consumed the
    /// previous claim yet, the new one simply takes its place.
    pub fn submit_input(&self, claim: impl Into<String>) {
        self.input.send_replace(InputSlot::Claim(claim.into()));
    }

    /// Signal that no further claims will arrive.
    ///
    /// The engine treats this like an input timeout: the game ends normally.
    pub fn close_input(&self) {
        self.input.send_replace(InputSlot::Closed);
    }

    /// Claim the inbound side of the input slot.
    ///
    /// A claim already sitting in the slot at this point is still delivered
    /// by the first [`InputReceiver::recv`].
    pub fn claim_input(&self) -> InputReceiver {
        let mut rx = self.input.subscribe();
        // Force the first recv to inspect whatever is already in the slot.
        rx.mark_changed();
        InputReceiver { rx }
    }
}

impl Default for ArenaBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer handle for the round-input slot.
pub struct InputReceiver {
    rx: watch::Receiver<InputSlot>,
}

impl InputReceiver {
    /// Wait for the next unconsumed claim.
    ///
    /// Returns [`TransportError::InputClosed`] once the slot is closed or
    /// the bus is gone.
    pub async fn recv(&mut self) -> TransportResult<String> {
        loop {
            self.rx
                .changed()
                .await
                .map_err(|_| TransportError::InputClosed)?;

            let slot = self.rx.borrow_and_update().clone();
            match slot {
                InputSlot::Claim(claim) => return Ok(claim),
                InputSlot::Closed => return Err(TransportError::InputClosed),
                InputSlot::Empty => continue,
            }
        }
    }
}
