//! Bot binary validation, run before any batch starts.

use crate::AppError;
use botgate_types::TestConfig;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// A binary that cannot answer `--help` inside this window is treated as
/// hung. Real bots print usage and exit in milliseconds.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const PROBE_POLL: Duration = Duration::from_millis(20);

/// Check that `path` points at something we could actually launch.
///
/// The `--help` probe accepts any exit status. A bot that rejects the flag
/// with a nonzero exit still proved it starts and terminates; only a hang
/// fails the probe.
pub fn validate_bot_binary(path: &str) -> Result<(), AppError> {
    let meta = std::fs::metadata(path).map_err(|_| AppError::BinaryMissing {
        path: path.to_string(),
    })?;
    if !meta.is_file() {
        return Err(AppError::BinaryNotAFile {
            path: path.to_string(),
        });
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(AppError::BinaryNotExecutable {
                path: path.to_string(),
            });
        }
    }

    let mut child = Command::new(path)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| AppError::BinaryProbeFailed {
            path: path.to_string(),
            source,
        })?;

    let deadline = Instant::now() + PROBE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(path, code = status.code().unwrap_or(-1), "binary probe exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::BinaryProbeFailed {
                    path: path.to_string(),
                    source,
                });
            }
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::BinaryHung {
                path: path.to_string(),
            });
        }
        std::thread::sleep(PROBE_POLL);
    }
}

/// Validate the executable at the front of a bot command line.
///
/// Bot entries may carry arguments (`"./bot --level 3"`); only the program
/// itself is probed. Splitting follows the same shell rules the spawner
/// uses, so validation and launch agree on what the program is.
pub fn validate_bot_command(command: &str) -> Result<(), AppError> {
    let argv = shell_words::split(command).map_err(|_| AppError::BinaryMissing {
        path: command.to_string(),
    })?;
    let Some(program) = argv.first() else {
        return Err(AppError::BinaryMissing {
            path: command.to_string(),
        });
    };
    validate_bot_binary(program)
}

/// Validate every distinct bot command a config references, each once.
pub fn validate_config_binaries(config: &TestConfig) -> Result<(), AppError> {
    let mut commands = vec![config.challenger_path.as_str()];
    if let Some(baseline) = config.baseline_path.as_deref()
        && !baseline.trim().is_empty()
    {
        commands.push(baseline);
    }
    commands.dedup();
    for command in commands {
        validate_bot_command(command)?;
    }
    Ok(())
}
