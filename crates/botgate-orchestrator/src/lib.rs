//! The sequential batch loop.
//!
//! One `execute_batches` call drives a strategy through as many batches as
//! its hand budget needs: configure, run, parse, aggregate, check for early
//! stop, repeat. Batches never overlap, so seeds, health state, and the
//! growing batch list stay reproducible. A fresh health monitor scoped to
//! the strategy's policy lives exactly as long as the call; its summary is
//! merged into the outcome on every exit path.

use botgate_health::HealthMonitor;
use botgate_server::{CancelToken, GameRunner, ServerError};
use botgate_stats::{clamp_std_dev, pooled_std_dev};
use botgate_strategy::{NPC_NAME_PREFIX, StrategyError, TestStrategy};
use botgate_types::{
    BatchResult, ClampNotice, ClampPolicy, EarlyStopping, ErrorSummary, GameStats, PlayerStats,
    SeatPlan, TestConfig, keys,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Seed step for batches beyond the configured list. Prime, so derived
/// seeds never collide with a short arithmetic seed list.
pub const SEED_DERIVE_OFFSET: u64 = 9_973;

/// Seed for batch 0 when no seed list is configured.
pub const DEFAULT_SEED: u64 = 42;

// A corrupt artifact could claim absurd timeout counts; feeding the monitor
// is capped so the loop stays bounded.
const TIMEOUT_FEED_CAP: u64 = 1_000;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("batch {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: ServerError,
    },

    #[error("batch {index} aggregation failed: {source}")]
    Aggregate {
        index: usize,
        #[source]
        source: StrategyError,
    },

    #[error("run cancelled")]
    Cancelled,
}

/// Everything a completed (possibly early-stopped) batch sequence produced.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batches: Vec<BatchResult>,
    pub hands_played: u64,
    pub stopped_early: bool,
    pub errors: ErrorSummary,
    pub clamp_notices: Vec<ClampNotice>,
}

/// A failed sequence still surfaces the batches that finished before it.
#[derive(Debug)]
pub struct BatchFailure {
    pub completed: Vec<BatchResult>,
    pub error: OrchestratorError,
    pub errors: ErrorSummary,
}

/// Seed for batch `index`: the configured list in order, then seeds derived
/// from the last entry, so a rerun with the same config replays the same
/// decks.
pub fn seed_for_batch(seeds: &[u64], index: usize) -> u64 {
    if let Some(&seed) = seeds.get(index) {
        return seed;
    }
    match seeds.last() {
        Some(&last) => {
            let beyond = (index + 1 - seeds.len()) as u64;
            last.wrapping_add(SEED_DERIVE_OFFSET.wrapping_mul(beyond))
        }
        None => DEFAULT_SEED.wrapping_add(SEED_DERIVE_OFFSET.wrapping_mul(index as u64)),
    }
}

pub struct BatchExecutor<R> {
    runner: R,
    seeds: Vec<u64>,
    batch_size: u64,
    clamp: ClampPolicy,
    stopping: EarlyStopping,
}

impl<R: GameRunner> BatchExecutor<R> {
    pub fn new(config: &TestConfig, runner: R) -> Self {
        Self {
            runner,
            seeds: config.seeds.clone(),
            batch_size: config.batch_size,
            clamp: config.clamp,
            stopping: config.early_stopping,
        }
    }

    pub fn runner_name(&self) -> &str {
        self.runner.name()
    }

    /// Run batches until `total_hands` are played, a stopping rule fires,
    /// a batch fails, or the run is cancelled.
    pub fn execute_batches(
        &self,
        strategy: &TestStrategy,
        total_hands: u64,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, BatchFailure> {
        let health = HealthMonitor::new(strategy.health_policy());

        let mut batches: Vec<BatchResult> = Vec::new();
        let mut clamp_notices = Vec::new();
        let mut hands_played = 0u64;
        let mut stopped_early = false;
        let mut batches_since_check = 0u32;
        let mut failure: Option<OrchestratorError> = None;

        let mut index = 0usize;
        while hands_played < total_hands {
            if cancel.is_cancelled() {
                failure = Some(OrchestratorError::Cancelled);
                break;
            }

            let hands = self.batch_size.min(total_hands - hands_played);
            let seed = seed_for_batch(&self.seeds, index).wrapping_add(strategy.seed_offset());
            let batch_cfg = strategy.configure_batch(index, seed, hands);
            info!(
                strategy = strategy.name(),
                batch = index,
                seed,
                hands,
                runner = self.runner.name(),
                "starting batch"
            );

            let stats = match self.runner.run_batch(&batch_cfg, &health, cancel) {
                Ok(stats) => stats,
                Err(ServerError::Cancelled) => {
                    failure = Some(OrchestratorError::Cancelled);
                    break;
                }
                Err(source) => {
                    warn!(batch = index, error = %source, "batch failed");
                    failure = Some(OrchestratorError::Batch { index, source });
                    break;
                }
            };

            feed_artifact_timeouts(&health, &stats, &batch_cfg.seat_plan);

            let metrics = match strategy.aggregate_stats(&stats) {
                Ok(metrics) => metrics,
                Err(source) => {
                    warn!(batch = index, error = %source, "aggregation failed");
                    failure = Some(OrchestratorError::Aggregate { index, source });
                    break;
                }
            };
            let std_devs =
                extract_std_devs(&stats, &batch_cfg.seat_plan, &self.clamp, &mut clamp_notices);

            // A server may legitimately deliver fewer hands than requested
            // (mass busts); count what actually happened. Zero means the
            // artifact did not track it, so fall back to the request.
            hands_played += if stats.hands_completed > 0 {
                stats.hands_completed
            } else {
                hands
            };
            batches.push(BatchResult {
                seed,
                hands,
                metrics,
                std_devs,
            });
            index += 1;

            batches_since_check += 1;
            if self.stopping.enabled
                && hands_played >= self.stopping.min_hands
                && batches_since_check >= self.stopping.check_interval
            {
                batches_since_check = 0;
                let latest = &batches[batches.len() - 1];
                if strategy.should_stop_early(&latest.metrics, hands_played) {
                    info!(batch = index - 1, hands_played, "stopping early");
                    stopped_early = true;
                    break;
                }
            }
        }

        // Single exit: whatever happened, the scoped monitor's summary
        // travels with the result.
        let errors = health.error_summary();
        match failure {
            None => Ok(BatchOutcome {
                batches,
                hands_played,
                stopped_early,
                errors,
                clamp_notices,
            }),
            Some(error) => Err(BatchFailure {
                completed: batches,
                error,
                errors,
            }),
        }
    }
}

/// Per-seat std devs, clamped, pooled per role within the batch.
///
/// Role keys (`challenger_std_dev`, ...) are always written for scored
/// roles; per-seat `player_N_std_dev` keys appear only when the table has
/// more than two scored seats and positions stop being self-describing.
fn extract_std_devs(
    stats: &GameStats,
    plan: &SeatPlan,
    clamp: &ClampPolicy,
    notices: &mut Vec<ClampNotice>,
) -> BTreeMap<String, f64> {
    let scored: Vec<_> = plan.scored_seats().collect();
    let per_seat_keys = scored.len() > 2;

    let mut std_devs = BTreeMap::new();
    let mut per_role: BTreeMap<&'static str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for &(seat, role) in &scored {
        let Some(player) = stats.players.get(seat) else {
            continue;
        };
        if player.display_name.starts_with(NPC_NAME_PREFIX) {
            continue;
        }
        let per_hand = player.detailed_stats.as_ref().and_then(|d| d.std_dev);
        let (bb100, notice) = clamp_std_dev(per_hand, clamp, &player_label(player, seat));
        if let Some(notice) = notice {
            notices.push(notice);
        }
        if per_seat_keys {
            std_devs.insert(keys::player_std_dev(seat), bb100);
        }
        let (sds, weights) = per_role.entry(role.key_prefix()).or_default();
        sds.push(bb100);
        weights.push(player.hands.max(1) as f64);
    }
    for (prefix, (sds, weights)) in per_role {
        std_devs.insert(
            keys::metric(prefix, keys::STD_DEV),
            pooled_std_dev(&sds, &weights),
        );
    }
    std_devs
}

/// In-game action timeouts only surface through the artifact, so the
/// monitor hears about them after the batch instead of live.
fn feed_artifact_timeouts(health: &HealthMonitor, stats: &GameStats, plan: &SeatPlan) {
    for (seat, player) in stats.players.iter().enumerate() {
        if plan.role_of(seat).is_none_or(|role| !role.is_scored()) {
            continue;
        }
        if player.display_name.starts_with(NPC_NAME_PREFIX) {
            continue;
        }
        let Some(detailed) = &player.detailed_stats else {
            continue;
        };
        let label = player_label(player, seat);
        for _ in 0..detailed.timeouts.min(TIMEOUT_FEED_CAP) {
            health.record_timeout(&label);
        }
    }
}

fn player_label(player: &PlayerStats, seat: usize) -> String {
    if !player.bot_id.is_empty() {
        player.bot_id.clone()
    } else if !player.display_name.is_empty() {
        player.display_name.clone()
    } else {
        format!("player_{seat}")
    }
}
