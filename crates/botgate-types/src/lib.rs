//! Shared types for botgate.
//!
//! Design goal: versioned, explicit, boring.
//! These structs are used for run results, report envelopes, and the stats
//! artifact exchanged with the game server.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod keys;

pub use config::{ClampPolicy, ConfigError, ConfigFile, EarlyStopping, HealthLimits, TestConfig};

pub const RESULT_SCHEMA_V1: &str = "botgate.result.v1";
pub const REPORT_SCHEMA_V1: &str = "botgate.report.v1";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunMetadata {
    pub start_time: String,
    pub duration_secs: f64,
    pub environment: HostInfo,
}

// ----------------------------
// Modes, roles, seat plans
// ----------------------------

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    HeadsUp,
    Population,
    NpcBenchmark,
    SelfPlay,
    /// CLI-level pseudo-mode: run every concrete mode whose bots are configured.
    All,
}

impl TestMode {
    /// The four modes a strategy can actually be built for.
    pub fn concrete() -> [TestMode; 4] {
        [
            TestMode::HeadsUp,
            TestMode::Population,
            TestMode::NpcBenchmark,
            TestMode::SelfPlay,
        ]
    }

    pub fn requires_baseline(self) -> bool {
        matches!(
            self,
            TestMode::HeadsUp | TestMode::Population | TestMode::NpcBenchmark
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::HeadsUp => "heads_up",
            TestMode::Population => "population",
            TestMode::NpcBenchmark => "npc_benchmark",
            TestMode::SelfPlay => "self_play",
            TestMode::All => "all",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "heads_up" | "headsup" => Ok(TestMode::HeadsUp),
            "population" => Ok(TestMode::Population),
            "npc_benchmark" | "npc" => Ok(TestMode::NpcBenchmark),
            "self_play" | "selfplay" => Ok(TestMode::SelfPlay),
            "all" => Ok(TestMode::All),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Challenger,
    Baseline,
    Npc,
    SelfPlay,
}

impl Role {
    /// Prefix used when building role-keyed metric names.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Role::Challenger => "challenger",
            Role::Baseline => "baseline",
            Role::Npc => "npc",
            Role::SelfPlay => "self_play",
        }
    }

    /// NPC seats are opponents, not subjects; they never enter aggregation.
    pub fn is_scored(self) -> bool {
        !matches!(self, Role::Npc)
    }
}

/// Ordered role spans over the seats of one table.
///
/// The game server reports players in seating order; strategies publish the
/// plan so downstream code never has to guess a role from an array position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatPlan {
    spans: Vec<(Role, usize)>,
}

impl SeatPlan {
    pub fn new(spans: Vec<(Role, usize)>) -> Self {
        Self {
            spans: spans.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }

    pub fn total_seats(&self) -> usize {
        self.spans.iter().map(|(_, n)| n).sum()
    }

    pub fn role_of(&self, seat: usize) -> Option<Role> {
        let mut offset = 0;
        for (role, n) in &self.spans {
            if seat < offset + n {
                return Some(*role);
            }
            offset += n;
        }
        None
    }

    /// Seat indices occupied by `role`; empty range when the role is absent.
    pub fn seats_for(&self, role: Role) -> std::ops::Range<usize> {
        let mut offset = 0;
        for (r, n) in &self.spans {
            if *r == role {
                return offset..offset + n;
            }
            offset += n;
        }
        0..0
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.spans.iter().map(|(role, _)| *role)
    }

    pub fn scored_seats(&self) -> impl Iterator<Item = (usize, Role)> + '_ {
        (0..self.total_seats()).filter_map(|seat| {
            self.role_of(seat)
                .filter(|role| role.is_scored())
                .map(|role| (seat, role))
        })
    }
}

/// Everything needed to launch one batch. Built by a strategy, consumed
/// immediately by the game runner.
#[derive(Debug, Clone)]
pub struct BatchConfiguration {
    /// Ordered bot launch command lines (seating order).
    pub bot_commands: Vec<String>,

    /// Roster string for server-built-in NPC opponents.
    pub npc_roster: Option<String>,

    pub seed: u64,
    pub hands: u64,
    pub seat_plan: SeatPlan,
}

// ----------------------------
// Game-server stats artifact
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GameStats {
    #[serde(default)]
    pub hands_completed: u64,

    #[serde(default = "default_big_blind")]
    pub big_blind: u64,

    #[serde(default = "default_small_blind")]
    pub small_blind: u64,

    pub players: Vec<PlayerStats>,
}

fn default_big_blind() -> u64 {
    100
}

fn default_small_blind() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PlayerStats {
    #[serde(default)]
    pub bot_id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub hands: u64,

    /// Chips won or lost over the batch. Fractional after odd pot splits.
    #[serde(default)]
    pub net_chips: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_stats: Option<DetailedStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct DetailedStats {
    #[serde(default)]
    pub bb_100: f64,

    #[serde(default)]
    pub vpip: f64,

    #[serde(default)]
    pub pfr: f64,

    #[serde(default)]
    pub timeouts: u64,

    #[serde(default)]
    pub busts: u64,

    /// Per-hand standard deviation in big blinds. Absent when the server
    /// tracked too few hands to estimate one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,

    #[serde(default)]
    pub responses_tracked: u64,

    #[serde(default)]
    pub avg_response_ms: f64,

    #[serde(default)]
    pub response_std_ms: f64,

    #[serde(default)]
    pub max_response_ms: f64,

    #[serde(default)]
    pub min_response_ms: f64,

    #[serde(default)]
    pub p95_response_ms: f64,

    #[serde(default)]
    pub response_timeouts: u64,

    #[serde(default)]
    pub response_disconnects: u64,
}

// ----------------------------
// Batch and health records
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchResult {
    pub seed: u64,

    /// Hands requested for this batch; actual counts live in `metrics`.
    pub hands: u64,

    pub metrics: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub std_devs: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BotStatus {
    pub bot_id: String,
    pub binary: String,
    pub display_name: String,
    pub crashes: u32,
    pub timeouts: u32,
    pub restarts: u32,
    pub healthy: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct ErrorSummary {
    pub crashes: u64,
    pub timeouts: u64,
    pub recovered: u64,
}

impl ErrorSummary {
    pub fn merge(&mut self, other: &ErrorSummary) {
        self.crashes += other.crashes;
        self.timeouts += other.timeouts;
        self.recovered += other.recovered;
    }
}

// ----------------------------
// Aggregates and verdicts
// ----------------------------

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClampReason {
    BelowMinThreshold,
    MissingStdDev,
    AggregateClamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClampNotice {
    pub bot: String,

    /// Observed BB/100 std dev, absent when the artifact carried none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,

    pub applied: f64,
    pub reason: ClampReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LatencyProfile {
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
    pub std_ms: f64,
    pub timeouts: u64,
    pub disconnects: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BotResults {
    /// Hands-weighted win rate in big blinds per 100 hands.
    pub bb_per_100: f64,

    pub ci_low: f64,
    pub ci_high: f64,

    pub hands: u64,
    pub vpip: f64,
    pub pfr: f64,
    pub timeout_rate: f64,
    pub bust_rate: f64,

    /// Not reported by the current stats artifact; populated when the
    /// server starts tracking bets vs. calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggression_factor: Option<f64>,

    pub std_dev_bb100: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct AggregateResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenger: Option<BotResults>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BotResults>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clamp_notices: Vec<ClampNotice>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improvement,
    Regression,
    Neutral,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Improvement => "improvement",
            Direction::Regression => "regression",
            Direction::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectMagnitude {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectMagnitude::Negligible => "negligible",
            EffectMagnitude::Small => "small",
            EffectMagnitude::Medium => "medium",
            EffectMagnitude::Large => "large",
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    Reject,
    Marginal,
    Inconclusive,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Accept => "accept",
            Recommendation::Reject => "reject",
            Recommendation::Marginal => "marginal",
            Recommendation::Inconclusive => "inconclusive",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TestVerdict {
    pub significant: bool,
    pub p_value: f64,

    /// Bonferroni-adjusted p-value, present when several modes ran together.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_p_value: Option<f64>,

    /// Cohen's d.
    pub effect_size: f64,
    pub effect_magnitude: EffectMagnitude,

    pub direction: Direction,

    /// 1 - p, as a plain-language confidence figure.
    pub confidence: f64,

    pub recommendation: Recommendation,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

// ----------------------------
// Top-level result and report
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConfigSummary {
    pub mode: TestMode,
    pub total_hands: u64,
    pub batch_size: u64,
    pub challenger_seats: usize,
    pub baseline_seats: usize,
    pub significance_level: f64,
    pub effect_size_threshold: f64,
    pub seed_count: usize,
    pub big_blind: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PerformanceSummary {
    pub hands_per_second: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_assessment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TestResult {
    pub schema: String,
    pub test_id: String,
    pub mode: TestMode,
    pub metadata: RunMetadata,
    pub config_summary: ConfigSummary,
    pub batches: Vec<BatchResult>,
    pub aggregate: AggregateResults,
    pub performance: PerformanceSummary,
    pub errors: ErrorSummary,
    pub verdict: TestVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TestReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub generated_at: String,

    /// Free-form run labels (CI job, branch) attached at report time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    pub results: Vec<TestResult>,
}
