//! The `botgate` binary driven end to end from TOML configs on disk.
#![allow(deprecated)]

use assert_cmd::Command;
use assert_cmd::assert::Assert;
use botgate_types::ConfigFile;
#[cfg(unix)]
use botgate_types::TestReport;
#[cfg(unix)]
use std::fs;
use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;

/// Split a readable command line and hand it to the binary.
fn botgate(cmdline: &str) -> Assert {
    let args = shell_words::split(cmdline).expect("parsable command line");
    Command::cargo_bin("botgate").unwrap().args(args).assert()
}

fn write_config(dir: &Path, file: &ConfigFile) -> std::path::PathBuf {
    let path = dir.join("botgate.toml");
    let body = toml::to_string_pretty(file).unwrap();
    std::fs::write(&path, body).unwrap();
    path
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in game server: first argv entry is a canned artifact, which it
/// copies to wherever the orchestrator pointed `--stats-out`.
#[cfg(unix)]
fn fake_table(dir: &Path, hands: u64, challenger_bb: f64, baseline_bb: f64) -> Vec<String> {
    let artifact = dir.join("canned-stats.json");
    let stats = serde_json::json!({
        "hands_completed": hands,
        "big_blind": 100,
        "small_blind": 50,
        "players": [
            {
                "bot_id": "challenger-0",
                "display_name": "challenger",
                "hands": hands,
                "net_chips": 0.0,
                "detailed_stats": {
                    "bb_100": challenger_bb, "vpip": 24.0, "pfr": 18.0, "std_dev": 5.0
                }
            },
            {
                "bot_id": "baseline-0",
                "display_name": "baseline",
                "hands": hands,
                "net_chips": 0.0,
                "detailed_stats": {
                    "bb_100": baseline_bb, "vpip": 22.0, "pfr": 16.0, "std_dev": 5.0
                }
            }
        ]
    });
    fs::write(&artifact, serde_json::to_vec_pretty(&stats).unwrap()).unwrap();

    let script = write_script(
        dir,
        "table.sh",
        r#"artifact="$1"; shift
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--stats-out" ]; then out="$a"; fi
  prev="$a"
done
cp "$artifact" "$out""#,
    );
    vec![
        script.display().to_string(),
        artifact.display().to_string(),
    ]
}

#[cfg(unix)]
fn gate_config(dir: &Path, hands: u64, batch_size: u64, server_command: Vec<String>) -> ConfigFile {
    let challenger = write_script(dir, "challenger.sh", "exit 0");
    let baseline = write_script(dir, "baseline.sh", "exit 0");

    let mut file = ConfigFile::default();
    file.test.mode = Some("heads_up".to_string());
    file.test.challenger = Some(challenger.display().to_string());
    file.test.baseline = Some(baseline.display().to_string());
    file.test.server_command = Some(server_command);
    file.test.hands = Some(hands);
    file.test.batch_size = Some(batch_size);
    file.test.seeds = Some(vec![5]);
    file.early_stopping.enabled = Some(false);
    file
}

#[cfg(unix)]
#[test]
fn a_toml_config_drives_a_full_gate() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_table(dir.path(), 100, 12.0, -3.0);
    let config = write_config(dir.path(), &gate_config(dir.path(), 300, 100, server));
    let report_path = dir.path().join("report.json");

    botgate(&format!(
        "run --config {} --out {}",
        config.display(),
        report_path.display()
    ))
    .success();

    let raw = fs::read_to_string(&report_path).unwrap();
    let report: TestReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(report.schema, "botgate.report.v1");
    assert_eq!(report.results.len(), 1);

    let result = &report.results[0];
    assert_eq!(result.batches.len(), 3);
    assert_eq!(result.batches[0].seed, 5);
    assert_eq!(result.aggregate.challenger.as_ref().unwrap().hands, 300);
    assert!(result.verdict.significant);
    assert_eq!(result.verdict.recommendation.as_str(), "accept");
}

#[cfg(unix)]
#[test]
fn labels_and_markdown_travel_with_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_table(dir.path(), 100, 12.0, -3.0);
    let config = write_config(dir.path(), &gate_config(dir.path(), 300, 100, server));
    let report_path = dir.path().join("report.json");
    let md_path = dir.path().join("report.md");

    botgate(&format!(
        "run --config {} --out {} --md {} --label branch=pr-7 --label job=nightly",
        config.display(),
        report_path.display(),
        md_path.display()
    ))
    .success();

    let report: TestReport =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report.labels["branch"], "pr-7");
    assert_eq!(report.labels["job"], "nightly");

    let md = fs::read_to_string(&md_path).unwrap();
    assert!(md.starts_with("✅ botgate: accept"));
    assert!(md.contains("| `heads_up` |"));
}

#[test]
fn run_refuses_a_config_missing_its_binaries() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = ConfigFile::default();
    file.test.mode = Some("self_play".to_string());
    file.test.challenger = Some(dir.path().join("missing-bot").display().to_string());
    file.test.server_command = Some(vec!["pokerforbots-server".to_string()]);
    let config = write_config(dir.path(), &file);
    let report_path = dir.path().join("report.json");

    let assert = botgate(&format!(
        "run --config {} --out {}",
        config.display(),
        report_path.display()
    ))
    .failure()
    .code(1);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("bot binary not found"));
    assert!(!report_path.exists());
}
