//! Aggregation math over arbitrary batch shapes. Whatever keys and values
//! the batches carry, pooling must return a number, never panic.

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use botgate_stats::{clamp_std_dev, pooled_metric_std_dev, weighted_mean};
use botgate_types::{BatchResult, ClampPolicy};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzBatch {
    seed: u64,
    hands: u64,
    metrics: BTreeMap<String, f64>,
    std_devs: BTreeMap<String, f64>,
}

#[derive(Arbitrary, Debug)]
struct PoolInput {
    batches: Vec<FuzzBatch>,
    metric_key: String,
    weight_key: String,
    per_hand_sd: Option<f64>,
}

fuzz_target!(|input: PoolInput| {
    let batches: Vec<BatchResult> = input
        .batches
        .into_iter()
        .map(|b| BatchResult {
            seed: b.seed,
            hands: b.hands,
            metrics: b.metrics,
            std_devs: b.std_devs,
        })
        .collect();

    let _ = weighted_mean(&batches, &input.metric_key, &input.weight_key);
    let _ = pooled_metric_std_dev(&batches, &input.metric_key, &input.weight_key);

    // The production key shape, so the corpus reaches the hot path.
    let _ = weighted_mean(&batches, "challenger_bb_per_100", "challenger_hands");

    let (clamped, _) = clamp_std_dev(input.per_hand_sd, &ClampPolicy::default(), "fuzz");
    assert!(clamped > 0.0);
});
