//! Runtime configuration for the arena engine.
//!
//! Values come from environment variables with defaults; the server binary
//! layers CLI flags on top via the `with_*` builders, and tests use the same
//! builders to shrink timeouts.

use std::path::PathBuf;
use std::time::Duration;

/// Tunable settings for one tournament run.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Chat-completions endpoint used for participant reasoning.
    pub completion_url: String,

    /// Model name sent with every completion request.
    pub completion_model: String,

    /// Optional bearer token for the completion endpoint.
    pub api_key: Option<String>,

    /// Upper bound for a single completion call, in seconds.
    pub call_timeout_secs: u64,

    /// How long to wait for each round's claim before ending the game,
    /// in seconds.
    pub input_timeout_secs: u64,

    /// Hard cap on rounds played.
    pub max_rounds: u32,

    /// Elimination and cloning run only while the round number is strictly
    /// below this bound.
    pub elimination_window: u32,

    /// Directory holding per-session state.
    pub base_dir: PathBuf,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            completion_url: std::env::var("ARENA_COMPLETION_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1/chat/completions".to_string()),
            completion_model: std::env::var("ARENA_COMPLETION_MODEL")
                .unwrap_or_else(|_| "mistral-small-3.2".to_string()),
            api_key: std::env::var("ARENA_API_KEY").ok(),
            call_timeout_secs: u64_from_env("ARENA_CALL_TIMEOUT_SECS", 30),
            input_timeout_secs: u64_from_env("ARENA_INPUT_TIMEOUT_SECS", 300),
            max_rounds: 10,
            elimination_window: 5,
            base_dir: std::env::var("ARENA_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl ArenaConfig {
    /// Override the completion endpoint.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.completion_url = url.into();
        self
    }

    /// Override the completion model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Override the per-call timeout.
    pub fn with_call_timeout_secs(mut self, secs: u64) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// Override the round-input timeout.
    pub fn with_input_timeout_secs(mut self, secs: u64) -> Self {
        self.input_timeout_secs = secs;
        self
    }

    /// Override the round cap.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Override the elimination window bound.
    pub fn with_elimination_window(mut self, window: u32) -> Self {
        self.elimination_window = window;
        self
    }

    /// Override the base directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Per-call completion deadline.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Round-input deadline.
    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }

    /// Whether `round` still eliminates a loser and clones a winner.
    pub fn in_elimination_window(&self, round: u32) -> bool {
        round < self.elimination_window
    }
}

fn u64_from_env(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let config = ArenaConfig::default()
            .with_endpoint("http://example.test/v1/chat/completions")
            .with_call_timeout_secs(2)
            .with_input_timeout_secs(1)
            .with_max_rounds(3)
            .with_base_dir("/tmp/arena-test");

        assert_eq!(
            config.completion_url,
            "http://example.test/v1/chat/completions"
        );
        assert_eq!(config.call_timeout(), Duration::from_secs(2));
        assert_eq!(config.input_timeout(), Duration::from_secs(1));
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.base_dir, PathBuf::from("/tmp/arena-test"));
    }

    #[test]
    fn test_elimination_window_bounds() {
        let config = ArenaConfig::default();
        assert!(config.in_elimination_window(1));
        assert!(config.in_elimination_window(4));
        assert!(!config.in_elimination_window(5));
        assert!(!config.in_elimination_window(10));

        let narrow = ArenaConfig::default().with_elimination_window(2);
        assert!(narrow.in_elimination_window(1));
        assert!(!narrow.in_elimination_window(2));
    }

    #[test]
    fn test_max_rounds_floor() {
        let config = ArenaConfig::default().with_max_rounds(0);
        assert_eq!(config.max_rounds, 1);
    }
}
