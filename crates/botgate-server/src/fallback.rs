//! Runner chain: try one runner, switch to another when it cannot start
//! games at all.

use crate::{CancelToken, GameRunner, ServerError};
use botgate_health::HealthMonitor;
use botgate_types::{BatchConfiguration, GameStats};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Runs batches on `primary` until it fails to start a game, then switches
/// to `secondary` for the rest of the run.
///
/// Only start-class failures trigger the switch. An error from a game that
/// did start is a result about this batch, not about the runner, and
/// propagates unchanged.
pub struct FallbackRunner<P, S> {
    primary: P,
    secondary: S,
    use_secondary: AtomicBool,
}

impl<P: GameRunner, S: GameRunner> FallbackRunner<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            use_secondary: AtomicBool::new(false),
        }
    }

    fn is_start_failure(err: &ServerError) -> bool {
        matches!(
            err,
            ServerError::EmbeddedUnavailable | ServerError::Spawn { .. } | ServerError::Embedded(_)
        )
    }
}

impl<P: GameRunner, S: GameRunner> GameRunner for FallbackRunner<P, S> {
    fn name(&self) -> &str {
        if self.use_secondary.load(Ordering::SeqCst) {
            self.secondary.name()
        } else {
            self.primary.name()
        }
    }

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        health: &HealthMonitor,
        cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        if self.use_secondary.load(Ordering::SeqCst) {
            return self.secondary.run_batch(batch, health, cancel);
        }
        match self.primary.run_batch(batch, health, cancel) {
            Err(e) if Self::is_start_failure(&e) => {
                warn!(
                    from = self.primary.name(),
                    to = self.secondary.name(),
                    error = %e,
                    "runner cannot start games, switching"
                );
                self.use_secondary.store(true, Ordering::SeqCst);
                self.secondary.run_batch(batch, health, cancel)
            }
            other => other,
        }
    }
}
