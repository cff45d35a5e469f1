//! End-to-end verdicts: known true edges in, accept/reject decisions out.

use crate::{BrokenRunner, TableRunner, config};
use botgate_app::{AppError, RunTestUseCase, SystemClock};
use botgate_server::CancelToken;
use botgate_significance::{GroupStats, compare};
use botgate_stats::weighted_mean;
use botgate_types::{Direction, RESULT_SCHEMA_V1, Recommendation, Role, TestMode, keys};

#[test]
fn a_real_edge_at_scale_is_detected() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 10_000, 1_000);

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert_eq!(result.schema, RESULT_SCHEMA_V1);
    assert_eq!(result.batches.len(), 10);
    let challenger = result.aggregate.challenger.as_ref().unwrap();
    assert_eq!(challenger.hands, 10_000);
    assert!(
        result.verdict.significant,
        "a 5 BB/100 edge over 10k hands per side must clear the test"
    );
    assert_eq!(result.verdict.direction, Direction::Improvement);
    assert_eq!(result.verdict.recommendation, Recommendation::Accept);
}

#[test]
fn identical_bots_produce_a_neutral_accept() {
    let use_case = RunTestUseCase::new(TableRunner::new(0.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 10_000, 1_000);

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert!(!result.verdict.significant);
    assert_eq!(result.verdict.effect_size, 0.0);
    assert_eq!(result.verdict.direction, Direction::Neutral);
    assert_eq!(result.verdict.recommendation, Recommendation::Accept);
}

#[test]
fn a_regression_is_rejected() {
    let use_case = RunTestUseCase::new(TableRunner::new(-5.0, 5.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 10_000, 1_000);

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    assert!(result.verdict.significant);
    assert_eq!(result.verdict.direction, Direction::Regression);
    assert_eq!(result.verdict.recommendation, Recommendation::Reject);
}

#[test]
fn population_mode_pools_every_seat() {
    let use_case = RunTestUseCase::new(TableRunner::new(6.0, 0.0), SystemClock);
    let mut cfg = config(TestMode::Population, 10_000, 1_000);
    cfg.challenger_seats = 3;
    cfg.baseline_seats = 3;

    let result = use_case
        .execute(TestMode::Population, &cfg, &CancelToken::new())
        .unwrap();

    // 3 seats x 1000 hands x 10 batches per role.
    let challenger = result.aggregate.challenger.as_ref().unwrap();
    let baseline = result.aggregate.baseline.as_ref().unwrap();
    assert_eq!(challenger.hands, 30_000);
    assert_eq!(baseline.hands, 30_000);
    assert!((challenger.bb_per_100 - 6.0).abs() < 1e-12);
    assert!(result.verdict.significant);
}

#[test]
fn npc_benchmark_runs_both_legs_against_the_same_roster() {
    let use_case = RunTestUseCase::new(TableRunner::new(8.0, 2.0), SystemClock);
    let cfg = config(TestMode::NpcBenchmark, 10_000, 1_000);

    let result = use_case
        .execute(TestMode::NpcBenchmark, &cfg, &CancelToken::new())
        .unwrap();

    // Two legs of ten batches each, NPC seats excluded from scoring.
    assert_eq!(result.batches.len(), 20);
    let challenger = result.aggregate.challenger.as_ref().unwrap();
    let baseline = result.aggregate.baseline.as_ref().unwrap();
    assert_eq!(challenger.hands, 10_000);
    assert_eq!(baseline.hands, 10_000);
    assert!((challenger.bb_per_100 - 8.0).abs() < 1e-12);
    assert!((baseline.bb_per_100 - 2.0).abs() < 1e-12);
    assert!(result.verdict.significant);
    assert_eq!(result.verdict.direction, Direction::Improvement);
}

#[test]
fn self_play_totals_to_a_zero_sum_accept() {
    let use_case = RunTestUseCase::new(TableRunner::new(0.25, 0.0), SystemClock);
    let cfg = config(TestMode::SelfPlay, 4_000, 1_000);

    let result = use_case
        .execute(TestMode::SelfPlay, &cfg, &CancelToken::new())
        .unwrap();

    assert!(result.aggregate.challenger.is_none());
    assert!(result.aggregate.baseline.is_none());
    assert_eq!(result.verdict.p_value, 1.0);
    assert_eq!(result.verdict.recommendation, Recommendation::Accept);
}

#[test]
fn all_modes_share_one_correction_family() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::All, 10_000, 1_000);

    let results = use_case.run_all_modes(&cfg, &CancelToken::new()).unwrap();

    let modes: Vec<TestMode> = results.iter().map(|r| r.mode).collect();
    assert_eq!(modes, TestMode::concrete().to_vec());
    for result in &results {
        assert!(result.verdict.adjusted_p_value.is_some());
    }
    // A four-way correction cannot wash out an edge this large.
    assert!(results[0].verdict.significant);
    assert_eq!(results[0].verdict.recommendation, Recommendation::Accept);
}

#[test]
fn the_aggregate_matches_the_stats_crate() {
    let use_case = RunTestUseCase::new(TableRunner::new(4.0, 1.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 6_000, 1_000);

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    let challenger = result.aggregate.challenger.as_ref().unwrap();
    let recomputed = weighted_mean(
        &result.batches,
        &keys::metric(Role::Challenger.key_prefix(), keys::BB_PER_100),
        &keys::metric(Role::Challenger.key_prefix(), keys::HANDS),
    );
    assert_eq!(challenger.bb_per_100, recomputed);
}

#[test]
fn the_verdict_matches_a_direct_welch_test() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 10_000, 1_000);

    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();

    let challenger = result.aggregate.challenger.as_ref().unwrap();
    let baseline = result.aggregate.baseline.as_ref().unwrap();
    let direct = compare(
        &GroupStats {
            mean: challenger.bb_per_100,
            std_dev: challenger.std_dev_bb100,
            n: challenger.hands,
        },
        &GroupStats {
            mean: baseline.bb_per_100,
            std_dev: baseline.std_dev_bb100,
            n: baseline.hands,
        },
        cfg.significance_level,
    );

    assert_eq!(result.verdict.p_value, direct.p_value);
    assert_eq!(result.verdict.significant, direct.significant);
}

#[test]
fn a_failing_server_surfaces_as_a_run_error() {
    let use_case = RunTestUseCase::new(BrokenRunner, SystemClock);
    let cfg = config(TestMode::HeadsUp, 2_000, 1_000);

    let err = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap_err();

    match &err {
        AppError::Run {
            mode, completed, ..
        } => {
            assert_eq!(*mode, TestMode::HeadsUp);
            assert_eq!(*completed, 0);
        }
        other => panic!("expected Run error, got {other:?}"),
    }
    assert!(err.to_string().contains("deck state corrupt"));
}

#[test]
fn cancellation_wins_over_everything() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 2_000, 1_000);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = use_case
        .execute(TestMode::HeadsUp, &cfg, &cancel)
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled));
}
