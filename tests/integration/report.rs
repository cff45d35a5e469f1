//! The report envelope: wire stability, round trips, and markdown output.

use crate::{TableRunner, config};
use botgate_app::{
    RunTestUseCase, SystemClock, build_report, overall_recommendation, render_markdown,
};
use botgate_server::CancelToken;
use botgate_types::{REPORT_SCHEMA_V1, Recommendation, TestMode, TestReport, ToolInfo};

fn tool() -> ToolInfo {
    ToolInfo {
        name: "botgate".into(),
        version: "0.0.0-test".into(),
    }
}

#[test]
fn a_report_round_trips_through_json() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 2_000, 1_000);
    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();
    let report = build_report(tool(), "2026-01-15T12:00:00Z".into(), vec![result]);
    assert_eq!(report.schema, REPORT_SCHEMA_V1);

    let json = serde_json::to_string_pretty(&report).unwrap();
    let back: TestReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn wire_field_names_are_stable() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 2_000, 1_000);
    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();
    let report = build_report(tool(), "2026-01-15T12:00:00Z".into(), vec![result]);

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["schema"].as_str(), Some("botgate.report.v1"));
    let result = &json["results"][0];
    assert_eq!(result["schema"].as_str(), Some("botgate.result.v1"));
    assert_eq!(result["mode"].as_str(), Some("heads_up"));
    assert!(result["verdict"]["p_value"].is_f64());
    assert!(result["aggregate"]["challenger"]["bb_per_100"].is_f64());
    assert!(result["batches"][0]["metrics"]["challenger_bb_per_100"].is_f64());
    assert!(result["batches"][0]["std_devs"]["challenger_std_dev"].is_f64());
    assert!(result["metadata"]["environment"]["os"].is_string());
}

#[test]
fn markdown_rows_track_every_mode() {
    let use_case = RunTestUseCase::new(TableRunner::new(5.0, 0.0), SystemClock);
    let cfg = config(TestMode::All, 10_000, 1_000);
    let results = use_case.run_all_modes(&cfg, &CancelToken::new()).unwrap();

    assert_eq!(overall_recommendation(&results), Recommendation::Accept);

    let report = build_report(tool(), "2026-01-15T12:00:00Z".into(), results);
    let md = render_markdown(&report);

    assert!(md.starts_with("✅ botgate: accept"));
    assert!(md.contains("| `heads_up` |"));
    assert!(md.contains("| `population` |"));
    assert!(md.contains("| `npc_benchmark` |"));
    assert!(md.contains("| `self_play` |"));
    assert!(md.contains("**Tool:** `botgate 0.0.0-test`"));
}

#[test]
fn a_rejecting_mode_headlines_the_report() {
    let use_case = RunTestUseCase::new(TableRunner::new(-5.0, 5.0), SystemClock);
    let cfg = config(TestMode::HeadsUp, 10_000, 1_000);
    let result = use_case
        .execute(TestMode::HeadsUp, &cfg, &CancelToken::new())
        .unwrap();
    let report = build_report(tool(), "2026-01-15T12:00:00Z".into(), vec![result]);

    let md = render_markdown(&report);
    assert!(md.starts_with("❌ botgate: reject"));
    assert!(md.contains("❌ reject"));
}
