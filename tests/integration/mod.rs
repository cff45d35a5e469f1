//! Workspace integration tests.
//!
//! Everything here crosses crate boundaries: strategies feed the
//! orchestrator, batches feed aggregation, and verdicts land in the report
//! envelope. The game server is an in-process fake with a known true edge,
//! so every statistical outcome is predictable.

mod cli;
mod determinism;
mod pipeline;
mod report;

use botgate_health::HealthMonitor;
use botgate_server::{CancelToken, GameRunner, ServerError};
use botgate_types::{
    BatchConfiguration, DetailedStats, EarlyStopping, GameStats, PlayerStats, Role, TestConfig,
    TestMode,
};

/// In-process game table with a fixed per-role win rate. Every batch reports
/// the same numbers, so aggregates are exact and runs replay byte for byte.
///
/// The per-hand std dev of 5 big blinds converts to 50 BB/100 downstream,
/// well above the clamp floor.
pub struct TableRunner {
    challenger_bb: f64,
    baseline_bb: f64,
}

impl TableRunner {
    pub fn new(challenger_bb: f64, baseline_bb: f64) -> Self {
        Self {
            challenger_bb,
            baseline_bb,
        }
    }
}

impl GameRunner for TableRunner {
    fn name(&self) -> &str {
        "table"
    }

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        _health: &HealthMonitor,
        _cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        let plan = &batch.seat_plan;
        let mut players = Vec::new();
        for seat in 0..plan.total_seats() {
            let role = plan.role_of(seat).expect("seat inside the plan");
            let (name, bb) = match role {
                Role::Challenger => (format!("challenger-{seat}"), self.challenger_bb),
                Role::Baseline => (format!("baseline-{seat}"), self.baseline_bb),
                // Self-play seats alternate sign so the table sums to zero.
                Role::SelfPlay => {
                    let sign = if seat % 2 == 0 { 1.0 } else { -1.0 };
                    (format!("seat-{seat}"), sign * self.challenger_bb)
                }
                Role::Npc => (format!("npc_{seat}"), 0.0),
            };
            players.push(PlayerStats {
                bot_id: format!("bot-{seat}"),
                display_name: name,
                hands: batch.hands,
                net_chips: 0.0,
                detailed_stats: Some(DetailedStats {
                    bb_100: bb,
                    vpip: 24.0,
                    pfr: 18.0,
                    std_dev: Some(5.0),
                    ..Default::default()
                }),
            });
        }
        Ok(GameStats {
            hands_completed: batch.hands,
            big_blind: 100,
            small_blind: 50,
            players,
        })
    }
}

/// Always fails the first batch, for error-path tests.
pub struct BrokenRunner;

impl GameRunner for BrokenRunner {
    fn name(&self) -> &str {
        "broken"
    }

    fn run_batch(
        &self,
        _batch: &BatchConfiguration,
        _health: &HealthMonitor,
        _cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        Err(ServerError::ServerFailed {
            status: 7,
            stderr_tail: "deck state corrupt".into(),
        })
    }
}

pub fn config(mode: TestMode, hands: u64, batch: u64) -> TestConfig {
    TestConfig {
        mode,
        challenger_path: "./challenger".into(),
        baseline_path: Some("./baseline".into()),
        server_command: vec!["in-process".into()],
        challenger_seats: 1,
        baseline_seats: 1,
        total_hands: hands,
        batch_size: batch,
        seeds: vec![11, 12],
        early_stopping: EarlyStopping {
            enabled: false,
            ..EarlyStopping::default()
        },
        ..TestConfig::default()
    }
}
