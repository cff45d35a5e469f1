//! Game-server execution for botgate.
//!
//! In clean-arch terms: this is where we touch the world. One capability,
//! [`GameRunner`], runs a configured batch to completion and hands back the
//! stats artifact. Two implementations exist, an external server subprocess
//! and an embedded in-process host driving bot subprocesses, plus a chain
//! that tries embedded first and falls back.
//!
//! Strategies and the statistics engine never learn which one ran.

use botgate_health::HealthMonitor;
use botgate_types::{BatchConfiguration, GameStats};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod embedded;
pub mod fallback;
pub mod subprocess;

pub use embedded::{BotSpawner, EmbeddedGame, EmbeddedHost, EmbeddedRunner, UnavailableHost};
pub use fallback::FallbackRunner;
pub use subprocess::SubprocessRunner;

/// Cooperative cancellation flag spanning a whole run.
///
/// Cloned into the ctrl-c handler while runners poll it between waits;
/// nobody blocks on it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server command must not be empty")]
    EmptyServerCommand,

    #[error("failed to spawn {argv:?}: {source}")]
    Spawn {
        argv: Vec<String>,
        source: std::io::Error,
    },

    #[error("game server exited with status {status}: {stderr_tail}")]
    ServerFailed { status: i32, stderr_tail: String },

    #[error("stats artifact {path} unreadable: {source}")]
    ArtifactRead {
        path: String,
        source: std::io::Error,
    },

    #[error("stats artifact malformed: {0}")]
    ArtifactMalformed(String),

    #[error("no embedded game host available")]
    EmbeddedUnavailable,

    #[error("embedded host failed to start a game: {0}")]
    Embedded(String),

    #[error("failed to fetch stats from {url}: {message}")]
    StatsFetch { url: String, message: String },

    #[error("timed out waiting for game completion")]
    CompletionTimeout,

    #[error("batch cancelled")]
    Cancelled,
}

/// Runs one batch against a game server and returns its stats artifact.
pub trait GameRunner {
    fn name(&self) -> &str;

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        health: &HealthMonitor,
        cancel: &CancelToken,
    ) -> Result<GameStats, ServerError>;
}

impl<T: GameRunner + ?Sized> GameRunner for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        health: &HealthMonitor,
        cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        (**self).run_batch(batch, health, cancel)
    }
}

/// Parse the JSON stats artifact produced by a game server.
///
/// Optional fields may be absent; a payload without a `players` array is
/// rejected.
pub fn parse_stats_artifact(bytes: &[u8]) -> Result<GameStats, ServerError> {
    serde_json::from_slice(bytes).map_err(|e| ServerError::ArtifactMalformed(e.to_string()))
}
