//! Per-bot crash and timeout bookkeeping against configured limits.
//!
//! The monitor decides one thing: after a failure event, may the caller
//! restart this bot? Under the limit the answer is yes (after the configured
//! delay); at the limit the bot is marked unhealthy, once, and stays that
//! way for the rest of the run.
//!
//! Mutators are internally synchronized: the monitor is shared by
//! reference across the orchestrator/runner seam, and a runner is free to
//! record from whichever thread manages its bot processes.

use botgate_types::{BotStatus, ErrorSummary, HealthLimits};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Wall-clock source for failure timestamps. Injected so tests stay
/// deterministic.
pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

pub struct HealthMonitor {
    limits: HealthLimits,
    clock: Box<dyn Clock>,
    bots: Mutex<BTreeMap<String, BotStatus>>,
}

impl HealthMonitor {
    pub fn new(limits: HealthLimits) -> Self {
        Self::with_clock(limits, Box::new(SystemClock))
    }

    pub fn with_clock(limits: HealthLimits, clock: Box<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            bots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn limits(&self) -> &HealthLimits {
        &self.limits
    }

    pub fn restart_delay(&self) -> Duration {
        self.limits.restart_delay
    }

    pub fn register_bot(&self, bot_id: &str, binary: &str, display_name: &str) {
        let mut bots = lock(&self.bots);
        bots.entry(bot_id.to_string()).or_insert_with(|| BotStatus {
            bot_id: bot_id.to_string(),
            binary: binary.to_string(),
            display_name: display_name.to_string(),
            crashes: 0,
            timeouts: 0,
            restarts: 0,
            healthy: true,
            last_error_at: None,
        });
    }

    /// Record a crash. Returns whether the caller may restart the bot.
    pub fn record_crash(&self, bot_id: &str) -> bool {
        self.record_failure(bot_id, FailureKind::Crash)
    }

    /// Record an unresponsive-bot timeout. Returns whether the caller may
    /// restart the bot.
    pub fn record_timeout(&self, bot_id: &str) -> bool {
        self.record_failure(bot_id, FailureKind::Timeout)
    }

    fn record_failure(&self, bot_id: &str, kind: FailureKind) -> bool {
        let now = self.clock.now_rfc3339();
        let mut bots = lock(&self.bots);
        let status = bots.entry(bot_id.to_string()).or_insert_with(|| {
            // Runners may record ids the orchestrator never announced.
            // Track them anyway.
            BotStatus {
                bot_id: bot_id.to_string(),
                binary: String::new(),
                display_name: bot_id.to_string(),
                crashes: 0,
                timeouts: 0,
                restarts: 0,
                healthy: true,
                last_error_at: None,
            }
        });

        status.last_error_at = Some(now);
        let (count, limit) = match kind {
            FailureKind::Crash => {
                status.crashes += 1;
                (status.crashes, self.limits.max_crashes_per_bot)
            }
            FailureKind::Timeout => {
                status.timeouts += 1;
                (status.timeouts, self.limits.max_timeouts_per_bot)
            }
        };

        if !status.healthy {
            return false;
        }
        if count >= limit {
            status.healthy = false;
            warn!(
                bot = bot_id,
                crashes = status.crashes,
                timeouts = status.timeouts,
                "bot reached its {} limit, marking unhealthy",
                kind.as_str()
            );
            return false;
        }
        status.restarts += 1;
        true
    }

    pub fn is_healthy(&self, bot_id: &str) -> bool {
        lock(&self.bots)
            .get(bot_id)
            .map(|s| s.healthy)
            .unwrap_or(true)
    }

    pub fn status(&self, bot_id: &str) -> Option<BotStatus> {
        lock(&self.bots).get(bot_id).cloned()
    }

    pub fn all_statuses(&self) -> Vec<BotStatus> {
        lock(&self.bots).values().cloned().collect()
    }

    /// Totals across all bots: crashes, timeouts, and successful restarts.
    pub fn error_summary(&self) -> ErrorSummary {
        let bots = lock(&self.bots);
        let mut summary = ErrorSummary::default();
        for status in bots.values() {
            summary.crashes += u64::from(status.crashes);
            summary.timeouts += u64::from(status.timeouts);
            summary.recovered += u64::from(status.restarts);
        }
        summary
    }
}

#[derive(Copy, Clone)]
enum FailureKind {
    Crash,
    Timeout,
}

impl FailureKind {
    fn as_str(self) -> &'static str {
        match self {
            FailureKind::Crash => "crash",
            FailureKind::Timeout => "timeout",
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
