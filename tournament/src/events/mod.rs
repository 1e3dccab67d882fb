//! Event transport for the arena.
//!
//! Two halves:
//!
//! 1. **Event Types** (`types.rs`): everything the engine announces:
//!    round/phase boundaries, per-participant status and output, deaths,
//!    clones, state snapshots, and the end of the game.
//!
//! 2. **Bus** (`bus.rs`): Tokio broadcast pub/sub for the outbound stream,
//!    plus the single-slot watch channel that delivers round claims inward.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Engine    │────▶│   ArenaBus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────▲───────┘     └──────▲───────┘     └──────────────┘
//!        │ recv               │ submit_input
//!        └────────────────────┴──────────── claim feeder
//! ```

pub mod bus;
pub mod types;

// Re-export core types
pub use bus::{ArenaBus, InputReceiver, SharedArenaBus, TransportError, TransportResult};
pub use types::{AgentMessage, AgentState, ArenaEvent, GlobalState, PeerRank};
