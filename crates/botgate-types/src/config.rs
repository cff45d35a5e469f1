//! Run configuration: the resolved `TestConfig` plus the TOML file schema.
//!
//! A `ConfigFile` is what users write; `resolve()` folds it over the
//! defaults. CLI flag overrides are applied on top by the caller, which then
//! runs `TestConfig::validate()` once everything is merged.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::TestMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown test mode '{0}' (expected heads_up, population, npc_benchmark, self_play, or all)")]
    UnknownMode(String),

    #[error("challenger bot path is required")]
    MissingChallenger,

    #[error("mode {mode} requires a baseline bot path")]
    MissingBaseline { mode: TestMode },

    #[error("server command must not be empty")]
    MissingServerCommand,

    #[error("total hands must be positive")]
    ZeroHands,

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("{role} seat count must be at least 1")]
    ZeroSeats { role: &'static str },

    #[error("significance level must be in (0, 1), got {0}")]
    BadSignificance(f64),

    #[error("effect size threshold must be non-negative, got {0}")]
    BadEffectThreshold(f64),

    #[error("early stopping min_hands {min} exceeds max_hands {max}")]
    StoppingBounds { min: u64, max: u64 },

    #[error("clamp fallback {fallback} must be at least the floor {min}")]
    ClampBounds { min: f64, fallback: f64 },

    #[error("invalid duration '{value}': {source}")]
    BadDuration {
        value: String,
        source: humantime::DurationError,
    },
}

/// Variance floor applied before any std dev is used for inference.
///
/// An explicit value threaded through every stats call; there is no global
/// clamp state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampPolicy {
    /// BB/100 std devs below this are considered degenerate.
    pub min_std_dev_bb100: f64,

    /// Substituted whenever the observed value is degenerate or missing.
    pub fallback_std_dev_bb100: f64,

    pub warn_on_clamp: bool,
}

impl Default for ClampPolicy {
    fn default() -> Self {
        Self {
            min_std_dev_bb100: 5.0,
            fallback_std_dev_bb100: 50.0,
            warn_on_clamp: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStopping {
    pub enabled: bool,

    /// No stopping decision is made below this many cumulative hands.
    pub min_hands: u64,

    pub max_hands: u64,

    /// Batches between stopping checks once `min_hands` is reached.
    pub check_interval: u32,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self {
            enabled: true,
            min_hands: 1_000,
            max_hands: 100_000,
            check_interval: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthLimits {
    pub max_crashes_per_bot: u32,
    pub max_timeouts_per_bot: u32,
    pub restart_delay: Duration,
}

impl Default for HealthLimits {
    fn default() -> Self {
        Self {
            max_crashes_per_bot: 3,
            max_timeouts_per_bot: 5,
            restart_delay: Duration::from_secs(2),
        }
    }
}

/// Immutable parameters for one run. Created once, read-only thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct TestConfig {
    pub mode: TestMode,

    pub challenger_path: String,
    pub baseline_path: Option<String>,

    /// argv for the external game server binary.
    pub server_command: Vec<String>,

    pub challenger_seats: usize,
    pub baseline_seats: usize,

    pub total_hands: u64,
    pub batch_size: u64,

    /// Assigned to batches in order; later batches derive seeds from the
    /// last entry so reruns stay reproducible.
    pub seeds: Vec<u64>,

    pub significance_level: f64,
    pub effect_size_threshold: f64,

    pub early_stopping: EarlyStopping,
    pub health: HealthLimits,
    pub clamp: ClampPolicy,

    pub npc_roster: Option<String>,
    pub big_blind: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            mode: TestMode::HeadsUp,
            challenger_path: String::new(),
            baseline_path: None,
            server_command: Vec::new(),
            challenger_seats: 3,
            baseline_seats: 3,
            total_hands: 10_000,
            batch_size: 1_000,
            seeds: Vec::new(),
            significance_level: 0.05,
            effect_size_threshold: 0.2,
            early_stopping: EarlyStopping::default(),
            health: HealthLimits::default(),
            clamp: ClampPolicy::default(),
            npc_roster: None,
            big_blind: 100,
        }
    }
}

impl TestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.challenger_path.trim().is_empty() {
            return Err(ConfigError::MissingChallenger);
        }
        if self.mode.requires_baseline()
            && self
                .baseline_path
                .as_deref()
                .is_none_or(|p| p.trim().is_empty())
        {
            return Err(ConfigError::MissingBaseline { mode: self.mode });
        }
        if self.server_command.is_empty() {
            return Err(ConfigError::MissingServerCommand);
        }
        if self.total_hands == 0 {
            return Err(ConfigError::ZeroHands);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.challenger_seats == 0 {
            return Err(ConfigError::ZeroSeats { role: "challenger" });
        }
        if self.mode == TestMode::Population && self.baseline_seats == 0 {
            return Err(ConfigError::ZeroSeats { role: "baseline" });
        }
        if self.significance_level <= 0.0
            || self.significance_level >= 1.0
            || self.significance_level.is_nan()
        {
            return Err(ConfigError::BadSignificance(self.significance_level));
        }
        if self.effect_size_threshold < 0.0 || self.effect_size_threshold.is_nan() {
            return Err(ConfigError::BadEffectThreshold(self.effect_size_threshold));
        }
        if self.early_stopping.min_hands > self.early_stopping.max_hands {
            return Err(ConfigError::StoppingBounds {
                min: self.early_stopping.min_hands,
                max: self.early_stopping.max_hands,
            });
        }
        if self.clamp.fallback_std_dev_bb100 < self.clamp.min_std_dev_bb100 {
            return Err(ConfigError::ClampBounds {
                min: self.clamp.min_std_dev_bb100,
                fallback: self.clamp.fallback_std_dev_bb100,
            });
        }
        Ok(())
    }
}

// ----------------------------
// TOML config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub test: TestSection,

    #[serde(default)]
    pub early_stopping: EarlyStoppingSection,

    #[serde(default)]
    pub health: HealthSection,

    #[serde(default)]
    pub clamp: ClampSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct TestSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenger: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,

    /// argv vector (no shell parsing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_command: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenger_seats: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_seats: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hands: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<Vec<u64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance_level: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect_size_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub npc_roster: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub big_blind: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct EarlyStoppingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_hands: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hands: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct HealthSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_crashes_per_bot: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeouts_per_bot: Option<u32>,

    /// Duration string parseable by humantime, e.g. "2s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ClampSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_std_dev_bb100: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_std_dev_bb100: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_on_clamp: Option<bool>,
}

impl ConfigFile {
    /// Fold the file over defaults. Does not validate; the caller applies
    /// flag overrides first and then calls `TestConfig::validate`.
    pub fn resolve(&self) -> Result<TestConfig, ConfigError> {
        let mut cfg = TestConfig::default();

        if let Some(mode) = &self.test.mode {
            cfg.mode = mode.parse()?;
        }
        if let Some(challenger) = &self.test.challenger {
            cfg.challenger_path = challenger.clone();
        }
        if let Some(baseline) = &self.test.baseline {
            cfg.baseline_path = Some(baseline.clone());
        }
        if let Some(cmd) = &self.test.server_command {
            cfg.server_command = cmd.clone();
        }
        if let Some(n) = self.test.challenger_seats {
            cfg.challenger_seats = n;
        }
        if let Some(n) = self.test.baseline_seats {
            cfg.baseline_seats = n;
        }
        if let Some(hands) = self.test.hands {
            cfg.total_hands = hands;
        }
        if let Some(batch) = self.test.batch_size {
            cfg.batch_size = batch;
        }
        if let Some(seeds) = &self.test.seeds {
            cfg.seeds = seeds.clone();
        }
        if let Some(level) = self.test.significance_level {
            cfg.significance_level = level;
        }
        if let Some(threshold) = self.test.effect_size_threshold {
            cfg.effect_size_threshold = threshold;
        }
        if let Some(roster) = &self.test.npc_roster {
            cfg.npc_roster = Some(roster.clone());
        }
        if let Some(bb) = self.test.big_blind {
            cfg.big_blind = bb;
        }

        if let Some(enabled) = self.early_stopping.enabled {
            cfg.early_stopping.enabled = enabled;
        }
        if let Some(min) = self.early_stopping.min_hands {
            cfg.early_stopping.min_hands = min;
        }
        if let Some(max) = self.early_stopping.max_hands {
            cfg.early_stopping.max_hands = max;
        }
        if let Some(interval) = self.early_stopping.check_interval {
            cfg.early_stopping.check_interval = interval;
        }

        if let Some(crashes) = self.health.max_crashes_per_bot {
            cfg.health.max_crashes_per_bot = crashes;
        }
        if let Some(timeouts) = self.health.max_timeouts_per_bot {
            cfg.health.max_timeouts_per_bot = timeouts;
        }
        if let Some(delay) = &self.health.restart_delay {
            cfg.health.restart_delay =
                humantime::parse_duration(delay).map_err(|source| ConfigError::BadDuration {
                    value: delay.clone(),
                    source,
                })?;
        }

        if let Some(min) = self.clamp.min_std_dev_bb100 {
            cfg.clamp.min_std_dev_bb100 = min;
        }
        if let Some(fallback) = self.clamp.fallback_std_dev_bb100 {
            cfg.clamp.fallback_std_dev_bb100 = fallback;
        }
        if let Some(warn) = self.clamp.warn_on_clamp {
            cfg.clamp.warn_on_clamp = warn;
        }

        Ok(cfg)
    }
}
