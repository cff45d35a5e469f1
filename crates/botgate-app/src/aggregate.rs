//! Batch-list aggregation into reportable results and verdicts.
//!
//! Everything here is pure: batches in, `BotResults`/`TestVerdict` out.
//! The use-case layer owns sequencing and IO.

use botgate_significance::{self as significance, GroupStats};
use botgate_stats as stats;
use botgate_strategy::SELF_PLAY_DRIFT_BB100;
use botgate_types::keys;
use botgate_types::{
    AggregateResults, BatchResult, BotResults, ClampNotice, ClampPolicy, Direction,
    EffectMagnitude, Recommendation, Role, TestVerdict,
};

/// Runs shorter than this cannot support a conclusion either way.
const UNRELIABLE_HANDS: u64 = 5_000;

/// Below this, a small observed effect deserves a bigger sample before
/// anyone acts on the verdict.
const SMALL_EFFECT_HANDS: u64 = 10_000;
const SMALL_EFFECT_D: f64 = 0.5;

/// Aggregate one role's batches into a reportable result.
///
/// Returns `None` when no batch carries the role's metrics, which is how
/// self-play runs and single-leg partial failures look. The aggregate
/// std dev is re-floored here; a notice lands in `notices` when the pooled
/// value was degenerate.
pub fn role_results(
    batches: &[BatchResult],
    role: Role,
    clamp: &ClampPolicy,
    confidence: f64,
    notices: &mut Vec<ClampNotice>,
) -> Option<BotResults> {
    let prefix = role.key_prefix();
    let bb_key = keys::metric(prefix, keys::BB_PER_100);
    if !batches.iter().any(|b| b.metrics.contains_key(&bb_key)) {
        return None;
    }

    let weight_key = keys::metric(prefix, keys::HANDS);
    let hands = stats::metric_sum(batches, &weight_key) as u64;
    let bb_per_100 = stats::weighted_mean(batches, &bb_key, &weight_key);

    let pooled = stats::pooled_metric_std_dev(
        batches,
        &keys::metric(prefix, keys::STD_DEV),
        &weight_key,
    );
    let (std_dev_bb100, notice) = stats::clamp_aggregate_std_dev(pooled, clamp, prefix);
    if let Some(notice) = notice {
        notices.push(notice);
    }

    let (ci_low, ci_high) =
        significance::confidence_interval(bb_per_100, std_dev_bb100, hands, confidence);

    Some(BotResults {
        bb_per_100,
        ci_low,
        ci_high,
        hands,
        vpip: stats::weighted_mean(batches, &keys::metric(prefix, keys::VPIP), &weight_key),
        pfr: stats::weighted_mean(batches, &keys::metric(prefix, keys::PFR), &weight_key),
        timeout_rate: stats::weighted_mean(
            batches,
            &keys::metric(prefix, keys::TIMEOUT_RATE),
            &weight_key,
        ),
        bust_rate: stats::weighted_mean(
            batches,
            &keys::metric(prefix, keys::BUST_RATE),
            &weight_key,
        ),
        // The artifact reports no bet/call split yet.
        aggression_factor: None,
        std_dev_bb100,
        latency: stats::latency_profile(batches, prefix, &weight_key),
    })
}

/// Aggregate both scored roles, extending the batch-level clamp notices
/// with any aggregate-level ones.
pub fn aggregate_results(
    batches: &[BatchResult],
    clamp: &ClampPolicy,
    confidence: f64,
    mut notices: Vec<ClampNotice>,
) -> AggregateResults {
    let challenger = role_results(batches, Role::Challenger, clamp, confidence, &mut notices);
    let baseline = role_results(batches, Role::Baseline, clamp, confidence, &mut notices);
    AggregateResults {
        challenger,
        baseline,
        clamp_notices: notices,
    }
}

fn group(results: &BotResults) -> GroupStats {
    GroupStats {
        mean: results.bb_per_100,
        std_dev: results.std_dev_bb100,
        n: results.hands,
    }
}

/// Verdict for anything without a two-sample comparison to stand on.
fn no_comparison_verdict(summary: String) -> TestVerdict {
    TestVerdict {
        significant: false,
        p_value: 1.0,
        adjusted_p_value: None,
        effect_size: 0.0,
        effect_magnitude: EffectMagnitude::Negligible,
        direction: Direction::Neutral,
        confidence: 0.0,
        recommendation: Recommendation::Inconclusive,
        summary,
    }
}

/// Challenger-vs-baseline verdict from aggregated results.
///
/// Recommendation policy: a significant regression is a reject and a
/// significant improvement an accept; without significance, a negligible
/// observed effect accepts and anything at or above the configured effect
/// threshold is marginal. Verdicts never fail a run by themselves.
pub fn build_verdict(
    aggregate: &AggregateResults,
    significance_level: f64,
    effect_size_threshold: f64,
) -> TestVerdict {
    let (Some(challenger), Some(baseline)) = (&aggregate.challenger, &aggregate.baseline) else {
        return no_comparison_verdict(
            "a scored role produced no results; no comparison possible".to_string(),
        );
    };

    let cmp = significance::compare(&group(challenger), &group(baseline), significance_level);
    let direction = if !cmp.significant || cmp.difference == 0.0 {
        Direction::Neutral
    } else if cmp.difference > 0.0 {
        Direction::Improvement
    } else {
        Direction::Regression
    };
    let effect_magnitude = significance::effect_magnitude(cmp.effect_size);
    let recommendation = if cmp.significant {
        match direction {
            Direction::Regression => Recommendation::Reject,
            _ => Recommendation::Accept,
        }
    } else if cmp.effect_size.abs() >= effect_size_threshold {
        Recommendation::Marginal
    } else {
        Recommendation::Accept
    };

    let summary = format!(
        "challenger {:+.2} BB/100 vs baseline ({:.2} vs {:.2} over {} / {} hands), p = {:.4}, d = {:.2} ({})",
        cmp.difference,
        challenger.bb_per_100,
        baseline.bb_per_100,
        challenger.hands,
        baseline.hands,
        cmp.p_value,
        cmp.effect_size,
        effect_magnitude.as_str(),
    );

    TestVerdict {
        significant: cmp.significant,
        p_value: cmp.p_value,
        adjusted_p_value: None,
        effect_size: cmp.effect_size,
        effect_magnitude,
        direction,
        confidence: 1.0 - cmp.p_value,
        recommendation,
        summary,
    }
}

/// Self-play has no opponent group to test against, so the verdict is a
/// plain accounting check: a zero-sum table should average out near zero.
pub fn self_play_verdict(batches: &[BatchResult]) -> TestVerdict {
    let avg = stats::weighted_mean(batches, keys::AVG_BB_PER_100, keys::HANDS);
    let spread = stats::metric_max(batches, keys::MAX_BB_PER_100).unwrap_or(0.0)
        - stats::metric_min(batches, keys::MIN_BB_PER_100).unwrap_or(0.0);

    let mut verdict = no_comparison_verdict(String::new());
    if avg.abs() > SELF_PLAY_DRIFT_BB100 {
        verdict.recommendation = Recommendation::Marginal;
        verdict.summary = format!(
            "self-play average {avg:+.2} BB/100 drifts from zero (seat spread {spread:.2}); \
             chip accounting or stats collection looks biased"
        );
    } else {
        verdict.recommendation = Recommendation::Accept;
        verdict.summary = format!(
            "self-play average {avg:+.2} BB/100 (seat spread {spread:.2}), consistent with a zero-sum table"
        );
    }
    verdict
}

/// Advisory string for runs too short to trust, `None` when the sample is
/// adequate for the observed effect.
pub fn sample_assessment(total_hands: u64, effect_size: f64) -> Option<String> {
    if total_hands < UNRELIABLE_HANDS {
        Some(format!(
            "sample size too small for reliable conclusions ({total_hands} hands)"
        ))
    } else if total_hands < SMALL_EFFECT_HANDS && effect_size.abs() < SMALL_EFFECT_D {
        Some(format!(
            "consider more hands for a small effect ({total_hands} hands, d = {:.2})",
            effect_size
        ))
    } else {
        None
    }
}
