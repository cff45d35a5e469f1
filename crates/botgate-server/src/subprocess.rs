//! External game-server subprocess runner.
//!
//! The server binary receives the seed, hand count, bot roster, and a temp
//! path for the stats artifact on its command line, runs the batch, writes
//! the artifact, and exits. Cancellation sends SIGINT, waits out a grace
//! period, then force-kills.

use crate::{CancelToken, GameRunner, ServerError, parse_stats_artifact};
use botgate_health::HealthMonitor;
use botgate_types::{BatchConfiguration, GameStats};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const STDERR_CAP_BYTES: usize = 16 * 1024;

pub struct SubprocessRunner {
    server_command: Vec<String>,
    batch_timeout: Option<Duration>,
    work_dir: Option<PathBuf>,
}

impl SubprocessRunner {
    pub fn new(server_command: Vec<String>) -> Self {
        Self {
            server_command,
            batch_timeout: None,
            work_dir: None,
        }
    }

    /// Hard cap on how long one batch may run before it counts as failed.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Directory for stats artifacts; defaults to the system temp dir.
    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }

    fn stats_path(&self) -> PathBuf {
        let dir = self
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("botgate-stats-{}.json", Uuid::new_v4()))
    }

    fn build_argv(&self, batch: &BatchConfiguration, stats_path: &Path) -> Vec<String> {
        let mut argv = self.server_command.clone();
        argv.push("--seed".into());
        argv.push(batch.seed.to_string());
        argv.push("--hands".into());
        argv.push(batch.hands.to_string());
        argv.push("--stats-out".into());
        argv.push(stats_path.display().to_string());
        for cmd in &batch.bot_commands {
            argv.push("--bot-cmd".into());
            argv.push(cmd.clone());
        }
        if let Some(roster) = &batch.npc_roster {
            argv.push("--npcs".into());
            argv.push(roster.clone());
        }
        argv
    }
}

impl GameRunner for SubprocessRunner {
    fn name(&self) -> &str {
        "subprocess"
    }

    fn run_batch(
        &self,
        batch: &BatchConfiguration,
        _health: &HealthMonitor,
        cancel: &CancelToken,
    ) -> Result<GameStats, ServerError> {
        if self.server_command.is_empty() {
            return Err(ServerError::EmptyServerCommand);
        }

        let stats_path = self.stats_path();
        let argv = self.build_argv(batch, &stats_path);
        debug!(seed = batch.seed, hands = batch.hands, server = %argv[0], "starting game server");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ServerError::Spawn {
            argv: argv.clone(),
            source,
        })?;

        let mut stderr = child.stderr.take().expect("stderr piped");
        let stderr_handle =
            std::thread::spawn(move || read_with_cap(&mut stderr, STDERR_CAP_BYTES));

        let started = Instant::now();
        let status = loop {
            if cancel.is_cancelled() {
                info!(seed = batch.seed, "cancelling running game server");
                graceful_stop(&mut child, SHUTDOWN_GRACE);
                let _ = stderr_handle.join();
                let _ = std::fs::remove_file(&stats_path);
                return Err(ServerError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(timeout) = self.batch_timeout
                        && started.elapsed() >= timeout
                    {
                        graceful_stop(&mut child, SHUTDOWN_GRACE);
                        let _ = stderr_handle.join();
                        let _ = std::fs::remove_file(&stats_path);
                        return Err(ServerError::CompletionTimeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stderr_handle.join();
                    let _ = std::fs::remove_file(&stats_path);
                    return Err(ServerError::Spawn { argv, source });
                }
            }
        };

        let stderr_bytes = stderr_handle.join().unwrap_or_default();
        if !status.success() {
            let _ = std::fs::remove_file(&stats_path);
            return Err(ServerError::ServerFailed {
                status: status.code().unwrap_or(-1),
                stderr_tail: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
            });
        }

        let bytes = std::fs::read(&stats_path).map_err(|source| ServerError::ArtifactRead {
            path: stats_path.display().to_string(),
            source,
        })?;
        let _ = std::fs::remove_file(&stats_path);
        parse_stats_artifact(&bytes)
    }
}

fn read_with_cap<R: Read>(reader: &mut R, cap: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 8192];
    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = (cap - buf.len()).min(n);
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
            Err(_) => break,
        }
    }
    buf
}

/// Interrupt, wait out the grace period, then force-kill and reap.
fn graceful_stop(child: &mut Child, grace: Duration) {
    send_interrupt(child);
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
        }
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGINT);
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) {
    // No SIGINT equivalent; the grace loop falls through to kill().
}

#[cfg(test)]
mod tests {
    use super::*;
    use botgate_types::{HealthLimits, Role, SeatPlan};

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthLimits::default())
    }

    fn batch(seed: u64, hands: u64) -> BatchConfiguration {
        BatchConfiguration {
            bot_commands: vec!["./challenger --fast".into(), "./baseline".into()],
            npc_roster: None,
            seed,
            hands,
            seat_plan: SeatPlan::new(vec![(Role::Challenger, 1), (Role::Baseline, 1)]),
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        writeln!(f, "{body}").unwrap();
        drop(f);
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    // Fake server: scans argv for --stats-out and writes a canned artifact
    // there, recording the full argv alongside for inspection.
    #[cfg(unix)]
    fn fake_server(dir: &Path) -> String {
        write_script(
            dir,
            "fake-server.sh",
            r#"
args_file="$1"; shift
printf '%s\n' "$@" > "$args_file"
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--stats-out" ]; then out="$a"; fi
  prev="$a"
done
cat > "$out" <<'EOF'
{
  "hands_completed": 250,
  "big_blind": 100,
  "small_blind": 50,
  "players": [
    { "bot_id": "c-0", "display_name": "challenger", "hands": 250, "net_chips": 500.0 },
    { "bot_id": "b-0", "display_name": "baseline", "hands": 250, "net_chips": -500.0 }
  ]
}
EOF
"#,
        )
    }

    #[cfg(unix)]
    #[test]
    fn runs_server_and_reads_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let server = fake_server(dir.path());
        let args_file = dir.path().join("argv.txt");
        let runner = SubprocessRunner::new(vec![server, args_file.display().to_string()])
            .with_work_dir(dir.path().to_path_buf());

        let stats = runner
            .run_batch(&batch(42, 250), &monitor(), &CancelToken::new())
            .unwrap();
        assert_eq!(stats.hands_completed, 250);
        assert_eq!(stats.players.len(), 2);

        let argv = std::fs::read_to_string(&args_file).unwrap();
        let lines: Vec<&str> = argv.lines().collect();
        let seed_at = lines.iter().position(|l| *l == "--seed").unwrap();
        assert_eq!(lines[seed_at + 1], "42");
        let hands_at = lines.iter().position(|l| *l == "--hands").unwrap();
        assert_eq!(lines[hands_at + 1], "250");
        let bot_at = lines.iter().position(|l| *l == "--bot-cmd").unwrap();
        assert_eq!(lines[bot_at + 1], "./challenger --fast");

        // The artifact temp file is cleaned up after a successful read.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("botgate-stats-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn npc_roster_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let server = fake_server(dir.path());
        let args_file = dir.path().join("argv.txt");
        let runner = SubprocessRunner::new(vec![server, args_file.display().to_string()])
            .with_work_dir(dir.path().to_path_buf());

        let mut cfg = batch(7, 100);
        cfg.npc_roster = Some("calling_station,aggressive".into());
        runner
            .run_batch(&cfg, &monitor(), &CancelToken::new())
            .unwrap();

        let argv = std::fs::read_to_string(&args_file).unwrap();
        let lines: Vec<&str> = argv.lines().collect();
        let npcs_at = lines.iter().position(|l| *l == "--npcs").unwrap();
        assert_eq!(lines[npcs_at + 1], "calling_station,aggressive");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_reports_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let server = write_script(
            dir.path(),
            "broken-server.sh",
            "echo 'deck exhausted' >&2\nexit 3",
        );
        let runner =
            SubprocessRunner::new(vec![server]).with_work_dir(dir.path().to_path_buf());

        let err = runner
            .run_batch(&batch(1, 100), &monitor(), &CancelToken::new())
            .unwrap_err();
        match err {
            ServerError::ServerFailed {
                status,
                stderr_tail,
            } => {
                assert_eq!(status, 3);
                assert!(stderr_tail.contains("deck exhausted"));
            }
            other => panic!("expected ServerFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_binary_reports_spawn_error() {
        let runner = SubprocessRunner::new(vec!["/nonexistent/botgate-server".into()]);
        let err = runner
            .run_batch(&batch(1, 100), &monitor(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ServerError::Spawn { .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        let runner = SubprocessRunner::new(Vec::new());
        let err = runner
            .run_batch(&batch(1, 100), &monitor(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ServerError::EmptyServerCommand));
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_stops_a_running_server() {
        let dir = tempfile::tempdir().unwrap();
        let server = write_script(dir.path(), "slow-server.sh", "sleep 30");
        let runner =
            SubprocessRunner::new(vec![server]).with_work_dir(dir.path().to_path_buf());

        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        let err = runner
            .run_batch(&batch(1, 100), &monitor(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ServerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn batch_timeout_kills_a_stuck_server() {
        let dir = tempfile::tempdir().unwrap();
        let server = write_script(dir.path(), "stuck-server.sh", "sleep 30");
        let runner = SubprocessRunner::new(vec![server])
            .with_work_dir(dir.path().to_path_buf())
            .with_batch_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = runner
            .run_batch(&batch(1, 100), &monitor(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ServerError::CompletionTimeout));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
