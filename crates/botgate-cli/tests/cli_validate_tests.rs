//! Integration tests for `botgate validate`.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use tempfile::tempdir;

#[cfg(unix)]
fn fake_bot(dir: &Path, name: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/sh").unwrap();
    writeln!(f, "exit 0").unwrap();
    drop(f);
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn validate_reports_what_would_run() {
    let dir = tempdir().expect("failed to create temp dir");
    let challenger = fake_bot(dir.path(), "challenger.sh");
    let baseline = fake_bot(dir.path(), "baseline.sh");

    let config = format!(
        r#"[test]
mode = "all"
challenger = "{challenger}"
baseline = "{baseline}"
server_command = ["pokerd", "--quiet"]
hands = 20000
"#,
        challenger = challenger.display(),
        baseline = baseline.display(),
    );
    let config_path = dir.path().join("gate.toml");
    fs::write(&config_path, config).unwrap();

    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate").arg("--config").arg(&config_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("config ok"))
        .stdout(predicate::str::contains("mode: all"))
        .stdout(predicate::str::contains("server: pokerd --quiet"))
        .stdout(predicate::str::contains("hands: 20000 per mode"))
        .stdout(predicate::str::contains(
            "would run: heads_up, population, npc_benchmark, self_play",
        ));
}

#[cfg(unix)]
#[test]
fn validate_without_a_baseline_plans_self_play_only() {
    let dir = tempdir().expect("failed to create temp dir");
    let challenger = fake_bot(dir.path(), "challenger.sh");

    let config = format!(
        r#"[test]
mode = "all"
challenger = "{challenger}"
server_command = ["pokerd"]
"#,
        challenger = challenger.display(),
    );
    let config_path = dir.path().join("gate.toml");
    fs::write(&config_path, config).unwrap();

    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate").arg("--config").arg(&config_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("would run: self_play"))
        .stdout(predicate::str::contains("heads_up").not());
}

#[test]
fn validate_rejects_a_config_without_a_challenger() {
    let dir = tempdir().expect("failed to create temp dir");
    let config_path = dir.path().join("gate.toml");
    fs::write(
        &config_path,
        "[test]\nserver_command = [\"pokerd\"]\nhands = 1000\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate").arg("--config").arg(&config_path);

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("challenger bot path is required"));
}

#[test]
fn validate_rejects_a_missing_bot_binary() {
    let dir = tempdir().expect("failed to create temp dir");
    let config = format!(
        r#"[test]
mode = "self_play"
challenger = "{}"
server_command = ["pokerd"]
"#,
        dir.path().join("no-such-bot").display(),
    );
    let config_path = dir.path().join("gate.toml");
    fs::write(&config_path, config).unwrap();

    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate").arg("--config").arg(&config_path);

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("bot binary not found"));
}

#[test]
fn validate_rejects_malformed_toml() {
    let dir = tempdir().expect("failed to create temp dir");
    let config_path = dir.path().join("gate.toml");
    fs::write(&config_path, "[test\nmode = ").unwrap();

    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate").arg("--config").arg(&config_path);

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("parse"));
}

#[test]
fn validate_requires_a_config_path() {
    let mut cmd = Command::cargo_bin("botgate").expect("failed to find botgate binary");
    cmd.arg("validate");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}
