//! Use-cases for botgate: validate bots, run test modes, assemble reports.
//!
//! In clean-arch terms this crate is the application layer. It owns the
//! sequencing (which strategy, which legs, what order) and delegates the
//! actual work: batch execution to `botgate-orchestrator`, math to
//! `botgate-stats` and `botgate-significance`. IO stays behind the
//! [`GameRunner`] and [`Clock`] seams so every use-case runs under test
//! with fakes.

use botgate_orchestrator::{BatchExecutor, BatchOutcome, OrchestratorError};
use botgate_server::{CancelToken, GameRunner};
use botgate_significance as significance;
use botgate_strategy::{StrategyError, TestStrategy};
use botgate_types::{
    AggregateResults, BotResults, ConfigError, ConfigSummary, Direction, HostInfo,
    PerformanceSummary, REPORT_SCHEMA_V1, RESULT_SCHEMA_V1, Recommendation, Role, RunMetadata,
    TestConfig, TestMode, TestReport, TestResult, ToolInfo,
};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod aggregate;
pub mod validate;

pub use aggregate::{
    aggregate_results, build_verdict, role_results, sample_assessment, self_play_verdict,
};
pub use botgate_health::{Clock, SystemClock};
pub use validate::{validate_bot_binary, validate_bot_command, validate_config_binaries};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("bot binary not found: {path}")]
    BinaryMissing { path: String },

    #[error("bot path is not a regular file: {path}")]
    BinaryNotAFile { path: String },

    #[error("bot binary is not executable: {path}")]
    BinaryNotExecutable { path: String },

    #[error("bot binary could not be probed: {path}: {source}")]
    BinaryProbeFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bot binary hung answering --help: {path}")]
    BinaryHung { path: String },

    #[error("{mode} run failed after {completed} completed batches: {source}")]
    Run {
        mode: TestMode,
        completed: usize,
        #[source]
        source: OrchestratorError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("no mode produced a result")]
    NoResults,
}

/// Runs one test mode end to end and assembles its [`TestResult`].
///
/// Generic over the runner and clock the same way the adapters are
/// injected everywhere else; production wires a real server chain and
/// [`SystemClock`].
pub struct RunTestUseCase<R: GameRunner, C: Clock> {
    runner: R,
    clock: C,
}

impl<R: GameRunner, C: Clock> RunTestUseCase<R, C> {
    pub fn new(runner: R, clock: C) -> Self {
        Self { runner, clock }
    }

    /// Execute `mode` under `config`.
    ///
    /// NpcBenchmark runs two independent legs (challenger vs NPCs, then
    /// baseline vs NPCs on offset seeds) and compares them afterwards;
    /// every other mode is a single batch sequence. Fatal batch errors
    /// abort with no result; cancellation surfaces as [`AppError::Cancelled`].
    pub fn execute(
        &self,
        mode: TestMode,
        config: &TestConfig,
        cancel: &CancelToken,
    ) -> Result<TestResult, AppError> {
        let started_at = self.clock.now_rfc3339();
        let wall = Instant::now();
        let test_id = Uuid::new_v4().to_string();
        let total_hands = effective_total_hands(config);
        let executor = BatchExecutor::new(config, &self.runner);

        info!(
            test_id,
            mode = %mode,
            runner = executor.runner_name(),
            total_hands,
            "starting test run"
        );

        let (batches, hands_played, errors, clamp_notices) = match mode {
            TestMode::NpcBenchmark => {
                let challenger_leg = TestStrategy::npc_leg(Role::Challenger, config)?;
                let baseline_leg = TestStrategy::npc_leg(Role::Baseline, config)?;
                let first = self.run_leg(&executor, &challenger_leg, total_hands, mode, cancel)?;
                let second = self.run_leg(&executor, &baseline_leg, total_hands, mode, cancel)?;

                let mut batches = first.batches;
                batches.extend(second.batches);
                let mut errors = first.errors;
                errors.merge(&second.errors);
                let mut clamp_notices = first.clamp_notices;
                clamp_notices.extend(second.clamp_notices);
                (
                    batches,
                    first.hands_played + second.hands_played,
                    errors,
                    clamp_notices,
                )
            }
            _ => {
                let strategy = TestStrategy::for_mode(mode, config)?;
                let outcome = self.run_leg(&executor, &strategy, total_hands, mode, cancel)?;
                (
                    outcome.batches,
                    outcome.hands_played,
                    outcome.errors,
                    outcome.clamp_notices,
                )
            }
        };

        let confidence = 1.0 - config.significance_level;
        let (aggregate, verdict) = if mode == TestMode::SelfPlay {
            // Table-level metrics only; there is no role pair to compare.
            let aggregate = AggregateResults {
                challenger: None,
                baseline: None,
                clamp_notices,
            };
            (aggregate, aggregate::self_play_verdict(&batches))
        } else {
            let aggregate =
                aggregate::aggregate_results(&batches, &config.clamp, confidence, clamp_notices);
            let verdict = aggregate::build_verdict(
                &aggregate,
                config.significance_level,
                config.effect_size_threshold,
            );
            (aggregate, verdict)
        };

        let elapsed = wall.elapsed().as_secs_f64();
        let performance = PerformanceSummary {
            hands_per_second: if elapsed > 0.0 {
                hands_played as f64 / elapsed
            } else {
                0.0
            },
            sample_assessment: aggregate::sample_assessment(hands_played, verdict.effect_size),
        };

        info!(
            test_id,
            mode = %mode,
            hands_played,
            recommendation = verdict.recommendation.as_str(),
            "test run finished"
        );

        Ok(TestResult {
            schema: RESULT_SCHEMA_V1.to_string(),
            test_id,
            mode,
            metadata: RunMetadata {
                start_time: started_at,
                duration_secs: elapsed,
                environment: host_info(),
            },
            config_summary: config_summary(mode, config),
            batches,
            aggregate,
            performance,
            errors,
            verdict,
        })
    }

    /// Run every concrete mode the config has bots for, then correct the
    /// verdicts for the number of comparisons that actually produced a
    /// result.
    ///
    /// A mode failing is logged and skipped; cancellation stops the whole
    /// sweep immediately.
    pub fn run_all_modes(
        &self,
        config: &TestConfig,
        cancel: &CancelToken,
    ) -> Result<Vec<TestResult>, AppError> {
        let mut results = Vec::new();
        for mode in TestMode::concrete() {
            if mode.requires_baseline() && !has_baseline(config) {
                debug!(%mode, "skipping mode, no baseline bot configured");
                continue;
            }
            match self.execute(mode, config, cancel) {
                Ok(result) => results.push(result),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(error) => warn!(%mode, %error, "mode failed, continuing with remaining modes"),
            }
        }
        if results.is_empty() {
            return Err(AppError::NoResults);
        }
        apply_bonferroni(&mut results, config.significance_level);
        Ok(results)
    }

    fn run_leg(
        &self,
        executor: &BatchExecutor<&R>,
        strategy: &TestStrategy,
        total_hands: u64,
        mode: TestMode,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, AppError> {
        debug!(strategy = strategy.name(), total_hands, "running batches");
        executor
            .execute_batches(strategy, total_hands, cancel)
            .map_err(|failure| match failure.error {
                OrchestratorError::Cancelled => AppError::Cancelled,
                source => AppError::Run {
                    mode,
                    completed: failure.completed.len(),
                    source,
                },
            })
    }
}

/// Hand budget for one mode run. Early stopping's `max_hands` caps the
/// configured total while stopping is enabled.
fn effective_total_hands(config: &TestConfig) -> u64 {
    if config.early_stopping.enabled {
        config.total_hands.min(config.early_stopping.max_hands)
    } else {
        config.total_hands
    }
}

fn has_baseline(config: &TestConfig) -> bool {
    config
        .baseline_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty())
}

fn host_info() -> HostInfo {
    HostInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

fn config_summary(mode: TestMode, config: &TestConfig) -> ConfigSummary {
    ConfigSummary {
        mode,
        total_hands: config.total_hands,
        batch_size: config.batch_size,
        challenger_seats: config.challenger_seats,
        baseline_seats: config.baseline_seats,
        significance_level: config.significance_level,
        effect_size_threshold: config.effect_size_threshold,
        seed_count: config.seeds.len(),
        big_blind: config.big_blind,
    }
}

/// Adjust every verdict for the number of comparisons that ran together.
///
/// Significance is re-decided against the adjusted p-value. A verdict that
/// loses significance is downgraded to inconclusive rather than left
/// claiming an effect it can no longer support. With a single result there
/// is nothing to correct and no adjusted value is recorded.
pub fn apply_bonferroni(results: &mut [TestResult], significance_level: f64) {
    let k = results.len();
    if k <= 1 {
        return;
    }
    for result in results.iter_mut() {
        let verdict = &mut result.verdict;
        let adjusted = significance::bonferroni_adjust(verdict.p_value, k);
        verdict.adjusted_p_value = Some(adjusted);
        if verdict.significant && adjusted >= significance_level {
            info!(
                mode = %result.mode,
                adjusted,
                "significance lost after multiple-comparison correction"
            );
            verdict.significant = false;
            verdict.direction = Direction::Neutral;
            verdict.recommendation = Recommendation::Inconclusive;
            verdict.confidence = 1.0 - adjusted;
            verdict.summary = format!(
                "{}; not significant once corrected for {k} comparisons",
                verdict.summary
            );
        }
    }
}

/// Wrap per-mode results in the versioned report envelope. Labels, if any,
/// are the caller's to attach afterwards.
pub fn build_report(tool: ToolInfo, generated_at: String, results: Vec<TestResult>) -> TestReport {
    TestReport {
        schema: REPORT_SCHEMA_V1.to_string(),
        tool,
        generated_at,
        labels: std::collections::BTreeMap::new(),
        results,
    }
}

/// Worst verdict across the report, for the headline.
pub fn overall_recommendation(results: &[TestResult]) -> Recommendation {
    results
        .iter()
        .map(|r| r.verdict.recommendation)
        .max_by_key(|r| severity(*r))
        .unwrap_or(Recommendation::Inconclusive)
}

fn severity(recommendation: Recommendation) -> u8 {
    match recommendation {
        Recommendation::Accept => 0,
        Recommendation::Inconclusive => 1,
        Recommendation::Marginal => 2,
        Recommendation::Reject => 3,
    }
}

// ----------------------------
// Rendering helpers
// ----------------------------

pub fn render_markdown(report: &TestReport) -> String {
    let mut out = String::new();

    let header = match overall_recommendation(&report.results) {
        Recommendation::Accept => "✅ botgate: accept",
        Recommendation::Reject => "❌ botgate: reject",
        Recommendation::Marginal => "⚠️ botgate: marginal",
        Recommendation::Inconclusive => "⚠️ botgate: inconclusive",
    };
    out.push_str(header);
    out.push_str("\n\n");

    out.push_str(&format!(
        "**Tool:** `{} {}`  \n",
        report.tool.name, report.tool.version
    ));
    out.push_str(&format!("**Generated:** {}\n\n", report.generated_at));

    out.push_str("| mode | challenger BB/100 | baseline BB/100 | p | adj. p | effect (d) | verdict |\n");
    out.push_str("|---|---:|---:|---:|---:|---:|---|\n");

    for result in &report.results {
        let verdict = &result.verdict;
        out.push_str(&format!(
            "| `{mode}` | {challenger} | {baseline} | {p} | {adj} | {d:.2} | {icon} {rec} |\n",
            mode = result.mode,
            challenger = format_role(result.aggregate.challenger.as_ref()),
            baseline = format_role(result.aggregate.baseline.as_ref()),
            p = format_p(verdict.p_value),
            adj = verdict.adjusted_p_value.map(format_p).unwrap_or_default(),
            d = verdict.effect_size,
            icon = recommendation_icon(verdict.recommendation),
            rec = verdict.recommendation.as_str(),
        ));
    }

    let mut notes: Vec<String> = Vec::new();
    for result in &report.results {
        if !result.verdict.summary.is_empty() {
            notes.push(format!("`{}`: {}", result.mode, result.verdict.summary));
        }
        if let Some(assessment) = &result.performance.sample_assessment {
            notes.push(format!("`{}`: {}", result.mode, assessment));
        }
        if !result.aggregate.clamp_notices.is_empty() {
            notes.push(format!(
                "`{}`: std dev clamped for {} bot(s)",
                result.mode,
                result.aggregate.clamp_notices.len()
            ));
        }
        if result.errors.crashes > 0 || result.errors.timeouts > 0 {
            notes.push(format!(
                "`{}`: {} crash(es), {} timeout(s), {} restart(s)",
                result.mode, result.errors.crashes, result.errors.timeouts, result.errors.recovered
            ));
        }
    }
    if !notes.is_empty() {
        out.push_str("\n**Notes:**\n");
        for note in &notes {
            out.push_str(&format!("- {note}\n"));
        }
    }

    out
}

fn recommendation_icon(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::Accept => "✅",
        Recommendation::Reject => "❌",
        Recommendation::Marginal | Recommendation::Inconclusive => "⚠️",
    }
}

fn format_role(results: Option<&BotResults>) -> String {
    match results {
        Some(r) => format!("{:+.2}", r.bb_per_100),
        None => String::new(),
    }
}

fn format_p(p: f64) -> String {
    if p < 0.0001 {
        "<0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}
