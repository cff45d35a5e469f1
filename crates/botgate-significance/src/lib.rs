//! Inferential statistics for botgate: Student's t quantiles and p-values,
//! confidence intervals, Welch's two-sample t-test, Cohen's d, and the
//! Bonferroni correction.
//!
//! Sample sizes here are hand counts, which can be small for batched
//! experiments, so intervals and tests use the t distribution rather than a
//! fixed z. Every function is total: degenerate input (zero variance, n of
//! one, NaN) yields a defined conservative result instead of panicking.

use botgate_types::EffectMagnitude;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Mean, std dev, and sample size (hands) for one side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    pub mean: f64,
    pub std_dev: f64,
    pub n: u64,
}

/// Outcome of one Welch two-sample comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// challenger mean minus baseline mean.
    pub difference: f64,

    pub pooled_std_dev: f64,

    /// Cohen's d.
    pub effect_size: f64,

    pub standard_error: f64,
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub significant: bool,

    /// CI of the difference at the comparison's confidence level.
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Interval half-width used when a sample is too small for a t interval.
const DEGENERATE_MARGIN: f64 = 100.0;

fn usable_df(df: f64) -> f64 {
    if df.is_finite() && df > 0.0 { df } else { 1.0 }
}

/// Student's t quantile at probability `p` with `df` degrees of freedom.
pub fn t_quantile(p: f64, df: f64) -> f64 {
    // NaN survives clamp, and statrs panics on probabilities outside [0, 1].
    if p.is_nan() {
        return 0.0;
    }
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    match StudentsT::new(0.0, 1.0, usable_df(df)) {
        Ok(dist) => dist.inverse_cdf(p),
        Err(_) => 0.0,
    }
}

/// Two-tailed p-value for a t statistic, clamped to [0, 1].
pub fn two_tailed_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return 1.0;
    }
    match StudentsT::new(0.0, 1.0, usable_df(df)) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// t-based confidence interval around a mean.
///
/// `confidence` is the coverage (0.95 for 95%). With `n <= 1` there is no
/// usable variance estimate, so the interval is maximally wide rather than a
/// division by zero.
pub fn confidence_interval(mean: f64, std_dev: f64, n: u64, confidence: f64) -> (f64, f64) {
    if n <= 1 {
        return (mean - DEGENERATE_MARGIN, mean + DEGENERATE_MARGIN);
    }
    let confidence = confidence.clamp(0.5, 1.0 - 1e-12);
    let df = (n - 1) as f64;
    let t = t_quantile(0.5 + confidence / 2.0, df);
    let margin = t * std_dev / (n as f64).sqrt();
    (mean - margin, mean + margin)
}

/// Welch's two-sample t-test of challenger against baseline.
///
/// Variances are not assumed equal; degrees of freedom come from the
/// Welch–Satterthwaite approximation, floored at 2 when either sample has
/// n <= 1. A zero standard error (both variances zero) reports t = 0,
/// p = 1, never a NaN.
pub fn compare(challenger: &GroupStats, baseline: &GroupStats, alpha: f64) -> Comparison {
    let difference = challenger.mean - baseline.mean;
    if challenger.n == 0 || baseline.n == 0 {
        return Comparison {
            difference,
            pooled_std_dev: 0.0,
            effect_size: 0.0,
            standard_error: 0.0,
            t_statistic: 0.0,
            degrees_of_freedom: 2.0,
            p_value: 1.0,
            significant: false,
            ci_low: difference - DEGENERATE_MARGIN,
            ci_high: difference + DEGENERATE_MARGIN,
        };
    }

    let n1 = challenger.n as f64;
    let n2 = baseline.n as f64;
    let var1 = challenger.std_dev * challenger.std_dev;
    let var2 = baseline.std_dev * baseline.std_dev;

    let pooled_std_dev = if n1 + n2 > 2.0 {
        (((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0)).sqrt()
    } else {
        0.0
    };
    let effect_size = if pooled_std_dev > 0.0 {
        difference / pooled_std_dev
    } else {
        0.0
    };

    let standard_error = (var1 / n1 + var2 / n2).sqrt();
    let degrees_of_freedom = welch_satterthwaite(var1, n1, var2, n2);

    let (t_statistic, p_value) = if standard_error > 0.0 {
        let t = difference / standard_error;
        (t, two_tailed_p(t, degrees_of_freedom))
    } else {
        (0.0, 1.0)
    };

    let margin = t_quantile(1.0 - alpha / 2.0, degrees_of_freedom) * standard_error;
    Comparison {
        difference,
        pooled_std_dev,
        effect_size,
        standard_error,
        t_statistic,
        degrees_of_freedom,
        p_value,
        significant: p_value < alpha,
        ci_low: difference - margin,
        ci_high: difference + margin,
    }
}

fn welch_satterthwaite(var1: f64, n1: f64, var2: f64, n2: f64) -> f64 {
    if n1 <= 1.0 || n2 <= 1.0 {
        return 2.0;
    }
    let v1 = var1 / n1;
    let v2 = var2 / n2;
    let denom = v1 * v1 / (n1 - 1.0) + v2 * v2 / (n2 - 1.0);
    if denom > 0.0 {
        (v1 + v2) * (v1 + v2) / denom
    } else {
        // Both variances zero: fall back to the pooled-test df.
        (n1 + n2 - 2.0).max(2.0)
    }
}

/// Standard interpretation bins for |d|: 0.2 / 0.5 / 0.8.
pub fn effect_magnitude(d: f64) -> EffectMagnitude {
    if !d.is_finite() {
        return EffectMagnitude::Negligible;
    }
    let d = d.abs();
    if d < 0.2 {
        EffectMagnitude::Negligible
    } else if d < 0.5 {
        EffectMagnitude::Small
    } else if d < 0.8 {
        EffectMagnitude::Medium
    } else {
        EffectMagnitude::Large
    }
}

/// Bonferroni adjustment for `k` simultaneous tests: `min(1, p * k)`.
pub fn bonferroni_adjust(p: f64, k: usize) -> f64 {
    let k = k.max(1);
    (p * k as f64).min(1.0)
}
