//! Structure-aware fuzzing of the Welch comparison kernel.
//!
//! Groups and the significance level are fed raw, NaN and infinities
//! included: botgate-significance documents every function as total, so
//! any panic found here is a real bug.

#![no_main]

use arbitrary::Arbitrary;
use botgate_significance::{GroupStats, bonferroni_adjust, compare, effect_magnitude};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug, Clone, Copy)]
struct FuzzGroup {
    mean: f64,
    std_dev: f64,
    n: u64,
}

impl FuzzGroup {
    fn to_group(self) -> GroupStats {
        GroupStats {
            mean: self.mean,
            std_dev: self.std_dev,
            n: self.n,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct CompareInput {
    challenger: FuzzGroup,
    baseline: FuzzGroup,
    alpha: f64,
    comparisons: usize,
}

fuzz_target!(|input: CompareInput| {
    let outcome = compare(
        &input.challenger.to_group(),
        &input.baseline.to_group(),
        input.alpha,
    );
    let _ = effect_magnitude(outcome.effect_size);

    // p-values stay probabilities through the correction.
    let adjusted = bonferroni_adjust(outcome.p_value, input.comparisons);
    assert!((0.0..=1.0).contains(&adjusted));
});
