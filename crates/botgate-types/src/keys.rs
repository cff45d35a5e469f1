//! Metric-key vocabulary shared by strategies, the orchestrator, and
//! reporting.
//!
//! Role-keyed metrics are `<role>_<stat>`, e.g. `challenger_bb_per_100`.
//! Self-play publishes table-level keys instead (`avg_bb_per_100`).

pub const BB_PER_100: &str = "bb_per_100";
pub const HANDS: &str = "hands";
pub const VPIP: &str = "vpip";
pub const PFR: &str = "pfr";
pub const TIMEOUT_RATE: &str = "timeout_rate";
pub const BUST_RATE: &str = "bust_rate";
pub const STD_DEV: &str = "std_dev";

pub const AVG_RESPONSE_MS: &str = "avg_response_ms";
pub const P95_RESPONSE_MS: &str = "p95_response_ms";
pub const MAX_RESPONSE_MS: &str = "max_response_ms";
pub const MIN_RESPONSE_MS: &str = "min_response_ms";
pub const RESPONSE_STD_MS: &str = "response_std_ms";
pub const RESPONSE_TIMEOUTS: &str = "response_timeouts";
pub const RESPONSE_DISCONNECTS: &str = "response_disconnects";

// Self-play table-level keys.
pub const AVG_BB_PER_100: &str = "avg_bb_per_100";
pub const MIN_BB_PER_100: &str = "min_bb_per_100";
pub const MAX_BB_PER_100: &str = "max_bb_per_100";
pub const SEATS: &str = "seats";

pub fn metric(role_prefix: &str, stat: &str) -> String {
    format!("{role_prefix}_{stat}")
}

pub fn player_std_dev(seat: usize) -> String {
    format!("player_{seat}_std_dev")
}
