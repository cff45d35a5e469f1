//! Test-mode strategies: who sits where, how raw stats become role-keyed
//! metrics, and when a run may stop early.
//!
//! `TestStrategy` is a closed enum over the four modes so that batch
//! configuration and aggregation stay exhaustive; adding a mode is a
//! compile-time-checked change. A strategy never learns how its batches are
//! executed.

use botgate_types::{
    BatchConfiguration, ConfigError, EarlyStopping, GameStats, HealthLimits, PlayerStats, Role,
    SeatPlan, TestConfig, TestMode, keys,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// NPC opponents seated by the game server when no roster is configured.
pub const DEFAULT_NPC_ROSTER: &str = "calling_station,aggressive,random";

/// Game servers name scripted opponents with this display-name prefix.
pub const NPC_NAME_PREFIX: &str = "npc_";

/// Seed offset for the baseline leg of an NPC benchmark, so the two legs
/// never share deck randomness.
pub const NPC_LEG_SEED_OFFSET: u64 = 1_000_003;

/// A BB/100 gap this wide between the roles is decisive on its own.
const DECISIVE_GAP_BB100: f64 = 10.0;

/// Self-play average drifting further than this from zero indicates a
/// non-zero-sum accounting bug in the bot or server.
pub const SELF_PLAY_DRIFT_BB100: f64 = 5.0;

const SELF_PLAY_CRASH_CAP: u32 = 2;
const NPC_TIMEOUT_SLACK: u32 = 2;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{mode} aggregation expects exactly {expected} players, artifact has {actual}")]
    UnexpectedPlayerCount {
        mode: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{mode} artifact contains no scorable players")]
    NoScoredPlayers { mode: &'static str },
}

/// One test mode's behavior: seat composition, aggregation, stopping rules,
/// and health limits.
#[derive(Debug, Clone)]
pub enum TestStrategy {
    HeadsUp {
        challenger_cmd: String,
        baseline_cmd: String,
        stopping: EarlyStopping,
        health: HealthLimits,
    },
    Population {
        challenger_cmd: String,
        baseline_cmd: String,
        challenger_seats: usize,
        baseline_seats: usize,
        stopping: EarlyStopping,
        health: HealthLimits,
    },
    NpcBenchmark {
        role: Role,
        bot_cmd: String,
        seats: usize,
        roster: String,
        stopping: EarlyStopping,
        health: HealthLimits,
    },
    SelfPlay {
        bot_cmd: String,
        seats: usize,
        stopping: EarlyStopping,
        health: HealthLimits,
    },
}

impl TestStrategy {
    /// Build the strategy for a concrete mode, validating that the config
    /// carries what the mode needs. `NpcBenchmark` yields the challenger
    /// leg; use [`TestStrategy::npc_leg`] for the baseline leg.
    pub fn for_mode(mode: TestMode, config: &TestConfig) -> Result<Self, StrategyError> {
        match mode {
            TestMode::HeadsUp => Ok(TestStrategy::HeadsUp {
                challenger_cmd: config.challenger_path.clone(),
                baseline_cmd: require_baseline(mode, config)?,
                stopping: config.early_stopping,
                health: config.health,
            }),
            TestMode::Population => Ok(TestStrategy::Population {
                challenger_cmd: config.challenger_path.clone(),
                baseline_cmd: require_baseline(mode, config)?,
                challenger_seats: config.challenger_seats,
                baseline_seats: config.baseline_seats,
                stopping: config.early_stopping,
                health: config.health,
            }),
            TestMode::NpcBenchmark => Self::npc_leg(Role::Challenger, config),
            TestMode::SelfPlay => Ok(TestStrategy::SelfPlay {
                bot_cmd: config.challenger_path.clone(),
                // A table needs opponents even when they are all the same bot.
                seats: config.challenger_seats.max(2),
                stopping: config.early_stopping,
                health: config.health,
            }),
            TestMode::All => Err(ConfigError::UnknownMode(
                "all (strategies are built per concrete mode)".to_string(),
            )
            .into()),
        }
    }

    /// One leg of an NPC benchmark: `role`'s bot against the NPC roster.
    pub fn npc_leg(role: Role, config: &TestConfig) -> Result<Self, StrategyError> {
        let (bot_cmd, seats) = match role {
            Role::Challenger => (config.challenger_path.clone(), config.challenger_seats),
            Role::Baseline => (
                require_baseline(TestMode::NpcBenchmark, config)?,
                config.baseline_seats,
            ),
            _ => {
                return Err(ConfigError::UnknownMode(format!(
                    "npc benchmark leg for role {}",
                    role.key_prefix()
                ))
                .into());
            }
        };
        Ok(TestStrategy::NpcBenchmark {
            role,
            bot_cmd,
            seats,
            roster: config
                .npc_roster
                .clone()
                .unwrap_or_else(|| DEFAULT_NPC_ROSTER.to_string()),
            stopping: config.early_stopping,
            health: config.health,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestStrategy::HeadsUp { .. } => "heads_up",
            TestStrategy::Population { .. } => "population",
            TestStrategy::NpcBenchmark {
                role: Role::Baseline,
                ..
            } => "npc_benchmark_baseline",
            TestStrategy::NpcBenchmark { .. } => "npc_benchmark_challenger",
            TestStrategy::SelfPlay { .. } => "self_play",
        }
    }

    /// Role spans in seating order; the game server seats bots in exactly
    /// this order.
    pub fn seat_plan(&self) -> SeatPlan {
        match self {
            TestStrategy::HeadsUp { .. } => {
                SeatPlan::new(vec![(Role::Challenger, 1), (Role::Baseline, 1)])
            }
            TestStrategy::Population {
                challenger_seats,
                baseline_seats,
                ..
            } => SeatPlan::new(vec![
                (Role::Challenger, *challenger_seats),
                (Role::Baseline, *baseline_seats),
            ]),
            TestStrategy::NpcBenchmark {
                role, seats, roster, ..
            } => SeatPlan::new(vec![(*role, *seats), (Role::Npc, roster_size(roster))]),
            TestStrategy::SelfPlay { seats, .. } => SeatPlan::new(vec![(Role::SelfPlay, *seats)]),
        }
    }

    /// Added to the batch seed before a game launches. Non-zero only for
    /// the baseline leg of an NPC benchmark.
    pub fn seed_offset(&self) -> u64 {
        match self {
            TestStrategy::NpcBenchmark {
                role: Role::Baseline,
                ..
            } => NPC_LEG_SEED_OFFSET,
            _ => 0,
        }
    }

    pub fn configure_batch(&self, index: usize, seed: u64, hands: u64) -> BatchConfiguration {
        debug!(strategy = self.name(), batch = index, seed, hands, "configuring batch");
        let (bot_commands, npc_roster) = match self {
            TestStrategy::HeadsUp {
                challenger_cmd,
                baseline_cmd,
                ..
            } => (vec![challenger_cmd.clone(), baseline_cmd.clone()], None),
            TestStrategy::Population {
                challenger_cmd,
                baseline_cmd,
                challenger_seats,
                baseline_seats,
                ..
            } => {
                let mut commands = vec![challenger_cmd.clone(); *challenger_seats];
                commands.extend(std::iter::repeat_n(baseline_cmd.clone(), *baseline_seats));
                (commands, None)
            }
            TestStrategy::NpcBenchmark {
                bot_cmd,
                seats,
                roster,
                ..
            } => (vec![bot_cmd.clone(); *seats], Some(roster.clone())),
            TestStrategy::SelfPlay { bot_cmd, seats, .. } => {
                (vec![bot_cmd.clone(); *seats], None)
            }
        };
        BatchConfiguration {
            bot_commands,
            npc_roster,
            seed,
            hands,
            seat_plan: self.seat_plan(),
        }
    }

    /// Turn one batch's raw artifact into role-keyed metrics.
    ///
    /// Standard deviations are not extracted here; the batch loop pulls
    /// those out separately through the seat plan.
    pub fn aggregate_stats(
        &self,
        stats: &GameStats,
    ) -> Result<BTreeMap<String, f64>, StrategyError> {
        let mut metrics = BTreeMap::new();
        match self {
            TestStrategy::HeadsUp { .. } => {
                if stats.players.len() != 2 {
                    return Err(StrategyError::UnexpectedPlayerCount {
                        mode: self.name(),
                        expected: 2,
                        actual: stats.players.len(),
                    });
                }
                let plan = self.seat_plan();
                for (seat, role) in plan.scored_seats() {
                    role_metrics(
                        &mut metrics,
                        role.key_prefix(),
                        &[&stats.players[seat]],
                        stats.big_blind,
                    );
                }
            }
            TestStrategy::Population { .. } => {
                let plan = self.seat_plan();
                for role in [Role::Challenger, Role::Baseline] {
                    let players: Vec<&PlayerStats> = plan
                        .seats_for(role)
                        .filter_map(|seat| stats.players.get(seat))
                        .collect();
                    role_metrics(&mut metrics, role.key_prefix(), &players, stats.big_blind);
                }
            }
            TestStrategy::NpcBenchmark { role, .. } => {
                // NPCs are opponents, not subjects; the display-name prefix
                // identifies them regardless of seating order.
                let players: Vec<&PlayerStats> = stats
                    .players
                    .iter()
                    .filter(|p| !p.display_name.starts_with(NPC_NAME_PREFIX))
                    .collect();
                if players.is_empty() {
                    return Err(StrategyError::NoScoredPlayers { mode: self.name() });
                }
                role_metrics(&mut metrics, role.key_prefix(), &players, stats.big_blind);
            }
            TestStrategy::SelfPlay { .. } => {
                if stats.players.is_empty() {
                    return Err(StrategyError::NoScoredPlayers { mode: self.name() });
                }
                let mut weighted = 0.0;
                let mut weight = 0.0;
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for p in &stats.players {
                    let bb = player_bb_100(p, stats.big_blind);
                    weighted += bb * p.hands as f64;
                    weight += p.hands as f64;
                    lo = lo.min(bb);
                    hi = hi.max(bb);
                }
                let avg = if weight > 0.0 { weighted / weight } else { 0.0 };
                metrics.insert(keys::AVG_BB_PER_100.to_string(), avg);
                metrics.insert(keys::MIN_BB_PER_100.to_string(), lo);
                metrics.insert(keys::MAX_BB_PER_100.to_string(), hi);
                metrics.insert(keys::SEATS.to_string(), stats.players.len() as f64);
                metrics.insert(keys::HANDS.to_string(), stats.hands_completed as f64);
            }
        }
        Ok(metrics)
    }

    /// Whether the run may stop before exhausting its hand budget. Never
    /// fires below `min_hands` cumulative hands, whatever the metrics say.
    pub fn should_stop_early(&self, metrics: &BTreeMap<String, f64>, total_hands: u64) -> bool {
        let stopping = self.stopping();
        if !stopping.enabled || total_hands < stopping.min_hands {
            return false;
        }
        match self {
            TestStrategy::HeadsUp { .. } | TestStrategy::Population { .. } => {
                let challenger =
                    metrics.get(&keys::metric(Role::Challenger.key_prefix(), keys::BB_PER_100));
                let baseline =
                    metrics.get(&keys::metric(Role::Baseline.key_prefix(), keys::BB_PER_100));
                match (challenger, baseline) {
                    (Some(c), Some(b)) => (c - b).abs() > DECISIVE_GAP_BB100,
                    _ => false,
                }
            }
            // Legs must stay comparable, so neither ever shortens itself.
            TestStrategy::NpcBenchmark { .. } => false,
            TestStrategy::SelfPlay { .. } => {
                if total_hands < 2 * stopping.min_hands {
                    return false;
                }
                let drifted = metrics
                    .get(keys::AVG_BB_PER_100)
                    .is_some_and(|avg| avg.abs() > SELF_PLAY_DRIFT_BB100);
                if drifted {
                    warn!(
                        total_hands,
                        "self-play average drifted from zero, stopping; check bot accounting"
                    );
                }
                drifted
            }
        }
    }

    /// Health limits for this mode, derived from the configured limits.
    pub fn health_policy(&self) -> HealthLimits {
        let base = *self.health();
        match self {
            // A bot crashing against itself is never recoverable noise.
            TestStrategy::SelfPlay { .. } => HealthLimits {
                max_crashes_per_bot: base.max_crashes_per_bot.min(SELF_PLAY_CRASH_CAP),
                ..base
            },
            // Scripted NPCs answer instantly, making the scored bot's share
            // of the clock larger than in bot-vs-bot play.
            TestStrategy::NpcBenchmark { .. } => HealthLimits {
                max_timeouts_per_bot: base.max_timeouts_per_bot + NPC_TIMEOUT_SLACK,
                ..base
            },
            _ => base,
        }
    }

    fn stopping(&self) -> &EarlyStopping {
        match self {
            TestStrategy::HeadsUp { stopping, .. }
            | TestStrategy::Population { stopping, .. }
            | TestStrategy::NpcBenchmark { stopping, .. }
            | TestStrategy::SelfPlay { stopping, .. } => stopping,
        }
    }

    fn health(&self) -> &HealthLimits {
        match self {
            TestStrategy::HeadsUp { health, .. }
            | TestStrategy::Population { health, .. }
            | TestStrategy::NpcBenchmark { health, .. }
            | TestStrategy::SelfPlay { health, .. } => health,
        }
    }
}

fn require_baseline(mode: TestMode, config: &TestConfig) -> Result<String, ConfigError> {
    match config.baseline_path.as_deref() {
        Some(p) if !p.trim().is_empty() => Ok(p.to_string()),
        _ => Err(ConfigError::MissingBaseline { mode }),
    }
}

fn roster_size(roster: &str) -> usize {
    roster.split(',').filter(|s| !s.trim().is_empty()).count()
}

/// A player's BB/100: the server's own figure when detailed stats exist,
/// otherwise derived from net chips.
fn player_bb_100(p: &PlayerStats, big_blind: u64) -> f64 {
    if let Some(d) = &p.detailed_stats {
        return d.bb_100;
    }
    if p.hands == 0 || big_blind == 0 {
        return 0.0;
    }
    (p.net_chips / big_blind as f64) * 100.0 / p.hands as f64
}

/// Hands-weighted metrics for one role's players under `prefix`.
fn role_metrics(
    metrics: &mut BTreeMap<String, f64>,
    prefix: &str,
    players: &[&PlayerStats],
    big_blind: u64,
) {
    let total_hands: u64 = players.iter().map(|p| p.hands).sum();
    let weight = total_hands as f64;

    let mut bb = 0.0;
    let mut vpip = 0.0;
    let mut pfr = 0.0;
    let mut timeouts = 0u64;
    let mut busts = 0u64;
    for p in players {
        let w = p.hands as f64;
        bb += player_bb_100(p, big_blind) * w;
        if let Some(d) = &p.detailed_stats {
            vpip += d.vpip * w;
            pfr += d.pfr * w;
            timeouts += d.timeouts;
            busts += d.busts;
        }
    }
    let weighted = |sum: f64| if weight > 0.0 { sum / weight } else { 0.0 };

    metrics.insert(keys::metric(prefix, keys::BB_PER_100), weighted(bb));
    metrics.insert(keys::metric(prefix, keys::HANDS), weight);
    metrics.insert(keys::metric(prefix, keys::VPIP), weighted(vpip));
    metrics.insert(keys::metric(prefix, keys::PFR), weighted(pfr));
    metrics.insert(
        keys::metric(prefix, keys::TIMEOUT_RATE),
        weighted(timeouts as f64),
    );
    metrics.insert(keys::metric(prefix, keys::BUST_RATE), weighted(busts as f64));

    latency_metrics(metrics, prefix, players);
}

/// Latency keys for a role, weighted by tracked responses. Inserted only
/// when at least one player tracked responses.
fn latency_metrics(metrics: &mut BTreeMap<String, f64>, prefix: &str, players: &[&PlayerStats]) {
    let mut tracked = 0.0;
    let mut avg = 0.0;
    let mut std = 0.0;
    let mut p95 = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut timeouts = 0u64;
    let mut disconnects = 0u64;
    for p in players {
        let Some(d) = &p.detailed_stats else { continue };
        if d.responses_tracked == 0 {
            continue;
        }
        let w = d.responses_tracked as f64;
        tracked += w;
        avg += d.avg_response_ms * w;
        std += d.response_std_ms * w;
        p95 += d.p95_response_ms * w;
        max = max.max(d.max_response_ms);
        min = min.min(d.min_response_ms);
        timeouts += d.response_timeouts;
        disconnects += d.response_disconnects;
    }
    if tracked == 0.0 {
        return;
    }
    metrics.insert(keys::metric(prefix, keys::AVG_RESPONSE_MS), avg / tracked);
    metrics.insert(keys::metric(prefix, keys::RESPONSE_STD_MS), std / tracked);
    metrics.insert(keys::metric(prefix, keys::P95_RESPONSE_MS), p95 / tracked);
    metrics.insert(keys::metric(prefix, keys::MAX_RESPONSE_MS), max);
    metrics.insert(keys::metric(prefix, keys::MIN_RESPONSE_MS), min);
    metrics.insert(
        keys::metric(prefix, keys::RESPONSE_TIMEOUTS),
        timeouts as f64,
    );
    metrics.insert(
        keys::metric(prefix, keys::RESPONSE_DISCONNECTS),
        disconnects as f64,
    );
}
