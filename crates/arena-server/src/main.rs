//! Debate arena runner.
//!
//! Drives one tournament session end to end. Round claims arrive one per
//! line on stdin, every engine event is logged (full payloads at debug
//! level), and the session directory holds the snapshot plus per-debater
//! round records. Works against any chat-completions endpoint.
//!
//! ```bash
//! # Fresh session, claims typed interactively
//! arena-server --endpoint http://localhost:8000/v1/chat/completions
//!
//! # Scripted claims, three rounds
//! printf 'Cats are liquids\nTabs beat spaces\nMars needs a flag\n' | \
//!     arena-server --max-rounds 3
//!
//! # Resume a session where it left off
//! arena-server --session 7cbdd334-0b77-4a34-9d21-26b9c90165e1
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tournament::{
    ArenaBus, ArenaConfig, GameEngine, GameRegistry, HttpCompletion, PhaseRunner, SessionStore,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session id to create or resume (UUID; generated when absent)
    #[arg(long)]
    session: Option<String>,

    /// Base directory for session state (overrides ARENA_BASE_DIR)
    #[arg(long)]
    dir: Option<std::path::PathBuf>,

    /// Chat-completions endpoint (overrides ARENA_COMPLETION_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name (overrides ARENA_COMPLETION_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Per-completion-call timeout in seconds (overrides ARENA_CALL_TIMEOUT_SECS)
    #[arg(long)]
    call_timeout_secs: Option<u64>,

    /// Per-round claim timeout in seconds (overrides ARENA_INPUT_TIMEOUT_SECS)
    #[arg(long)]
    input_timeout_secs: Option<u64>,

    /// Maximum number of rounds to play
    #[arg(long)]
    max_rounds: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = ArenaConfig::default();
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(secs) = args.call_timeout_secs {
        config = config.with_call_timeout_secs(secs);
    }
    if let Some(secs) = args.input_timeout_secs {
        config = config.with_input_timeout_secs(secs);
    }
    if let Some(rounds) = args.max_rounds {
        config = config.with_max_rounds(rounds);
    }
    if let Some(dir) = args.dir {
        config = config.with_base_dir(dir);
    }

    // Session ids are UUIDs; reject malformed ones before they become paths.
    let session_id = match args.session {
        Some(raw) => Uuid::parse_str(raw.trim())
            .with_context(|| format!("invalid session id {raw:?}"))?
            .to_string(),
        None => Uuid::new_v4().to_string(),
    };

    info!(
        session_id = %session_id,
        endpoint = %config.completion_url,
        model = %config.completion_model,
        max_rounds = config.max_rounds,
        "Arena server starting"
    );

    let completion = HttpCompletion::new(
        config.completion_url.clone(),
        config.completion_model.clone(),
        config.api_key.clone(),
    );
    if !completion.probe().await {
        bail!(
            "completion endpoint {} is unreachable",
            config.completion_url
        );
    }

    let registry = GameRegistry::new();
    let _game_guard = registry
        .register(&session_id)
        .context("cannot start game")?;

    let store = SessionStore::new(config.base_dir.clone());
    let (session, resumed) = store.get_or_create(&session_id)?;
    if resumed {
        info!(
            round = session.round,
            survivors = ?session.survivor_names(),
            "Resuming session"
        );
    } else {
        info!(dir = %store.base_dir().display(), "Starting new session");
    }

    let bus = ArenaBus::new().shared();
    let input = bus.claim_input();

    // Event log: one line per engine event, full payload at debug level.
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    info!(
                        event = event.event_type(),
                        round = ?event.round(),
                        "arena event"
                    );
                    if let Ok(json) = serde_json::to_string(&event) {
                        debug!(payload = %json, "event payload");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Claims arrive one per line; EOF ends the game at the next round.
    let feeder_bus = bus.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let claim = line.trim();
                    if !claim.is_empty() {
                        feeder_bus.submit_input(claim);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
        feeder_bus.close_input();
    });

    let runner = PhaseRunner::new(Arc::new(completion), bus.clone(), config.call_timeout());
    let engine = GameEngine::new(session, store, runner, bus.clone(), input, config);

    let report = engine.run().await;
    info!(
        survivors = ?report.survivors,
        rounds = report.rounds_completed,
        "Arena closed"
    );

    Ok(())
}
