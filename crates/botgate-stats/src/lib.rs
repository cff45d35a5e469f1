//! Cross-batch aggregation math for botgate.
//!
//! This crate is intentionally I/O-free: it does arithmetic and the
//! variance-floor policy, nothing else. Every function is total: degenerate
//! input produces a zero or fallback result, never a panic or error. These
//! run inside a long batch loop that must not abort on one malformed batch.
//!
//! All aggregation is hands-weighted. A 10,000-hand batch moves the mean ten
//! times as much as a 1,000-hand batch, regardless of how many batches ran.

use botgate_types::{BatchResult, ClampNotice, ClampPolicy, ClampReason, LatencyProfile};
use tracing::warn;

/// Per-hand std devs are scaled to per-100-hands by sqrt(100).
const PER_HAND_TO_BB100: f64 = 10.0;

/// Hands-weighted mean of `metric_key` across batches.
///
/// The weight for each batch is read from `weight_key` (the actual hands the
/// artifact reported); batches that omit it fall back to their nominal hand
/// count. Batches without the metric contribute nothing. Empty or weightless
/// input yields 0.0.
pub fn weighted_mean(batches: &[BatchResult], metric_key: &str, weight_key: &str) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for batch in batches {
        let Some(value) = batch.metrics.get(metric_key) else {
            continue;
        };
        let weight = batch_weight(batch, weight_key);
        if weight <= 0.0 {
            continue;
        }
        weighted_sum += value * weight;
        total_weight += weight;
    }
    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

/// Actual-hands weight for one batch, falling back to the nominal count.
pub fn batch_weight(batch: &BatchResult, weight_key: &str) -> f64 {
    batch
        .metrics
        .get(weight_key)
        .copied()
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(batch.hands as f64)
}

/// Weighted root-mean-square combination of per-batch standard deviations:
/// `sqrt(Σ wᵢ·sdᵢ² / Σ wᵢ)`.
///
/// Not a naive average: two batches with equal std devs pool to exactly
/// that std dev whatever their weights. Mismatched slice lengths or a zero
/// total weight yield 0.0.
pub fn pooled_std_dev(std_devs: &[f64], weights: &[f64]) -> f64 {
    if std_devs.is_empty() || std_devs.len() != weights.len() {
        return 0.0;
    }
    let mut weighted_var = 0.0;
    let mut total_weight = 0.0;
    for (sd, w) in std_devs.iter().zip(weights) {
        if !sd.is_finite() || !w.is_finite() || *w <= 0.0 {
            continue;
        }
        weighted_var += w * sd * sd;
        total_weight += w;
    }
    if total_weight > 0.0 {
        (weighted_var / total_weight).sqrt()
    } else {
        0.0
    }
}

/// Pool one std-dev key across batches, hands-weighted.
///
/// Returns `None` when no batch carries the key, so callers can tell
/// "nothing observed" apart from a genuinely small pooled value.
pub fn pooled_metric_std_dev(
    batches: &[BatchResult],
    std_dev_key: &str,
    weight_key: &str,
) -> Option<f64> {
    let mut std_devs = Vec::new();
    let mut weights = Vec::new();
    for batch in batches {
        if let Some(sd) = batch.std_devs.get(std_dev_key) {
            std_devs.push(*sd);
            weights.push(batch_weight(batch, weight_key));
        }
    }
    if std_devs.is_empty() {
        None
    } else {
        Some(pooled_std_dev(&std_devs, &weights))
    }
}

/// Convert a per-hand std dev to BB/100 and apply the variance floor.
///
/// Values converting below `policy.min_std_dev_bb100`, non-finite values,
/// and missing values are all replaced by the fallback; the returned notice
/// says which case it was. Inference downstream never sees a std dev of
/// zero.
pub fn clamp_std_dev(
    per_hand_sd: Option<f64>,
    policy: &ClampPolicy,
    bot: &str,
) -> (f64, Option<ClampNotice>) {
    match per_hand_sd {
        None => {
            let notice = ClampNotice {
                bot: bot.to_string(),
                observed: None,
                applied: policy.fallback_std_dev_bb100,
                reason: ClampReason::MissingStdDev,
            };
            if policy.warn_on_clamp {
                warn!(bot, applied = policy.fallback_std_dev_bb100, "no std dev reported, using fallback");
            }
            (policy.fallback_std_dev_bb100, Some(notice))
        }
        Some(sd) => {
            let bb100 = sd * PER_HAND_TO_BB100;
            if bb100.is_finite() && bb100 >= policy.min_std_dev_bb100 {
                return (bb100, None);
            }
            let notice = ClampNotice {
                bot: bot.to_string(),
                observed: Some(bb100),
                applied: policy.fallback_std_dev_bb100,
                reason: ClampReason::BelowMinThreshold,
            };
            if policy.warn_on_clamp {
                warn!(
                    bot,
                    observed = bb100,
                    floor = policy.min_std_dev_bb100,
                    applied = policy.fallback_std_dev_bb100,
                    "std dev below floor, using fallback"
                );
            }
            (policy.fallback_std_dev_bb100, Some(notice))
        }
    }
}

/// Floor check for an already-pooled BB/100 std dev.
///
/// Used at aggregate time, where "no batch ever reported a std dev" and
/// "pooled value is degenerate" both collapse to the fallback with an
/// aggregate-clamp notice.
pub fn clamp_aggregate_std_dev(
    pooled_bb100: Option<f64>,
    policy: &ClampPolicy,
    bot: &str,
) -> (f64, Option<ClampNotice>) {
    if let Some(pooled) = pooled_bb100
        && pooled.is_finite()
        && pooled >= policy.min_std_dev_bb100
    {
        return (pooled, None);
    }
    let notice = ClampNotice {
        bot: bot.to_string(),
        observed: pooled_bb100.filter(|v| v.is_finite()),
        applied: policy.fallback_std_dev_bb100,
        reason: ClampReason::AggregateClamp,
    };
    if policy.warn_on_clamp {
        warn!(
            bot,
            applied = policy.fallback_std_dev_bb100,
            "aggregate std dev degenerate, using fallback"
        );
    }
    (policy.fallback_std_dev_bb100, Some(notice))
}

/// Sum of a metric across the batches that carry it.
pub fn metric_sum(batches: &[BatchResult], metric_key: &str) -> f64 {
    batches
        .iter()
        .filter_map(|b| b.metrics.get(metric_key))
        .sum()
}

pub fn metric_max(batches: &[BatchResult], metric_key: &str) -> Option<f64> {
    batches
        .iter()
        .filter_map(|b| b.metrics.get(metric_key).copied())
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

pub fn metric_min(batches: &[BatchResult], metric_key: &str) -> Option<f64> {
    batches
        .iter()
        .filter_map(|b| b.metrics.get(metric_key).copied())
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

/// Cross-batch latency distribution for one role, when any batch tracked it.
///
/// Means pool hands-weighted; extremes take the batch extremes; timeout and
/// disconnect counts sum.
pub fn latency_profile(
    batches: &[BatchResult],
    role_prefix: &str,
    weight_key: &str,
) -> Option<LatencyProfile> {
    use botgate_types::keys;

    let avg_key = keys::metric(role_prefix, keys::AVG_RESPONSE_MS);
    if !batches.iter().any(|b| b.metrics.contains_key(&avg_key)) {
        return None;
    }
    Some(LatencyProfile {
        avg_ms: weighted_mean(batches, &avg_key, weight_key),
        p95_ms: weighted_mean(
            batches,
            &keys::metric(role_prefix, keys::P95_RESPONSE_MS),
            weight_key,
        ),
        max_ms: metric_max(batches, &keys::metric(role_prefix, keys::MAX_RESPONSE_MS))
            .unwrap_or(0.0),
        min_ms: metric_min(batches, &keys::metric(role_prefix, keys::MIN_RESPONSE_MS))
            .unwrap_or(0.0),
        std_ms: weighted_mean(
            batches,
            &keys::metric(role_prefix, keys::RESPONSE_STD_MS),
            weight_key,
        ),
        timeouts: metric_sum(batches, &keys::metric(role_prefix, keys::RESPONSE_TIMEOUTS)) as u64,
        disconnects: metric_sum(
            batches,
            &keys::metric(role_prefix, keys::RESPONSE_DISCONNECTS),
        ) as u64,
    })
}
