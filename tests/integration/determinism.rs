//! Seed discipline and early stopping, observed through whole runs.

use crate::{TableRunner, config};
use botgate_app::{RunTestUseCase, SystemClock};
use botgate_orchestrator::seed_for_batch;
use botgate_server::CancelToken;
use botgate_strategy::NPC_LEG_SEED_OFFSET;
use botgate_types::{EarlyStopping, TestMode};

#[test]
fn reruns_replay_identical_batches() {
    let use_case = RunTestUseCase::new(TableRunner::new(4.0, 1.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 3_000, 1_000);

    let first = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();
    let second = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert_ne!(first.test_id, second.test_id);
    assert_eq!(first.batches, second.batches);
    assert_eq!(first.aggregate, second.aggregate);
    assert_eq!(first.verdict, second.verdict);
}

#[test]
fn configured_seeds_come_first_then_derived_ones() {
    let use_case = RunTestUseCase::new(TableRunner::new(4.0, 1.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 4_000, 1_000);
    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    let seeds: Vec<u64> = result.batches.iter().map(|b| b.seed).collect();
    assert_eq!(seeds[0], 11);
    assert_eq!(seeds[1], 12);
    assert_eq!(seeds[2], seed_for_batch(&[11, 12], 2));
    assert_eq!(seeds[3], seed_for_batch(&[11, 12], 3));

    let unique: std::collections::BTreeSet<u64> = seeds.iter().copied().collect();
    assert_eq!(unique.len(), 4);
}

#[test]
fn npc_legs_never_share_deck_randomness() {
    let use_case = RunTestUseCase::new(TableRunner::new(4.0, 1.0), SystemClock);
    let cfg = config(TestMode::NpcBenchmark, 2_000, 1_000);
    let result = use_case
        .execute(TestMode::NpcBenchmark, &cfg, &CancelToken::new())
        .unwrap();

    // Challenger leg first, then the baseline leg on offset seeds.
    assert_eq!(result.batches.len(), 4);
    assert_eq!(result.batches[0].seed, 11);
    assert_eq!(result.batches[1].seed, 12);
    assert_eq!(result.batches[2].seed, 11 + NPC_LEG_SEED_OFFSET);
    assert_eq!(result.batches[3].seed, 12 + NPC_LEG_SEED_OFFSET);
}

#[test]
fn a_decisive_gap_stops_the_run_early() {
    let use_case = RunTestUseCase::new(TableRunner::new(40.0, 0.0), SystemClock);
    let mut cfg = config(TestMode::HeadsUp, 10_000, 1_000);
    cfg.early_stopping = EarlyStopping {
        enabled: true,
        min_hands: 2_000,
        ..EarlyStopping::default()
    };

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert_eq!(result.batches.len(), 2);
    assert_eq!(result.aggregate.challenger.as_ref().unwrap().hands, 2_000);
    assert!(result.verdict.significant);
}

#[test]
fn stopping_waits_for_the_minimum_sample() {
    let use_case = RunTestUseCase::new(TableRunner::new(40.0, 0.0), SystemClock);
    let mut cfg = config(TestMode::HeadsUp, 10_000, 1_000);
    cfg.early_stopping = EarlyStopping {
        enabled: true,
        min_hands: 5_000,
        ..EarlyStopping::default()
    };

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert_eq!(result.batches.len(), 5);
}

#[test]
fn the_hand_budget_is_capped_by_max_hands() {
    // A 2 BB/100 gap never trips the decisive-gap rule, so only the cap
    // can end the run before the configured total.
    let use_case = RunTestUseCase::new(TableRunner::new(3.0, 1.0), SystemClock);
    let mut cfg = config(TestMode::HeadsUp, 10_000, 1_000);
    cfg.early_stopping = EarlyStopping {
        enabled: true,
        min_hands: 1_000,
        max_hands: 3_000,
        check_interval: 1,
    };

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert_eq!(result.batches.len(), 3);
    assert_eq!(result.aggregate.challenger.as_ref().unwrap().hands, 3_000);
}
