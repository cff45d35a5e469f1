use anyhow::Context;
use botgate_app::{
    build_report, overall_recommendation, render_markdown, validate_config_binaries, AppError,
    Clock, RunTestUseCase, SystemClock,
};
use botgate_server::{
    CancelToken, EmbeddedRunner, FallbackRunner, SubprocessRunner, UnavailableHost,
};
use botgate_types::{ConfigFile, Recommendation, TestConfig, TestMode, TestReport, ToolInfo};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "botgate",
    version,
    about = "Statistical accept/reject gate for poker bot changes"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test (or every applicable mode) and emit a report (JSON).
    Run {
        /// TOML config file; the flags below override individual fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Test mode: heads_up, population, npc_benchmark, self_play, all
        #[arg(long)]
        mode: Option<String>,

        /// Challenger bot binary
        #[arg(long)]
        challenger: Option<String>,

        /// Baseline bot binary
        #[arg(long)]
        baseline: Option<String>,

        /// Game server command line, e.g. "pokerd --quiet"
        #[arg(long)]
        server_cmd: Option<String>,

        /// Total hands per mode
        #[arg(long)]
        hands: Option<u64>,

        /// Hands per batch
        #[arg(long)]
        batch_size: Option<u64>,

        /// Base seeds, comma separated (batches cycle through them)
        #[arg(long)]
        seeds: Option<String>,

        /// Significance level alpha
        #[arg(long)]
        significance: Option<f64>,

        /// Output report path
        #[arg(long, default_value = "botgate-report.json")]
        out: PathBuf,

        /// Also render markdown, to a path or to stdout with `-`
        #[arg(long)]
        md: Option<String>,

        /// Treat a marginal overall verdict as a failing exit code
        #[arg(long, default_value_t = false)]
        fail_on_marginal: bool,

        /// Report label (KEY=VALUE). Repeatable.
        #[arg(long, value_parser = parse_key_val_string)]
        label: Vec<(String, String)>,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Render a Markdown summary from an existing report.
    Md {
        #[arg(long = "in")]
        input: PathBuf,

        /// Output markdown path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check a config and its bot binaries without playing a hand.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },

    /// Print the report JSON schema.
    Schema,
}

fn main() -> ExitCode {
    init_tracing();

    if let Err(err) = real_main() {
        eprintln!("{err:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            config,
            mode,
            challenger,
            baseline,
            server_cmd,
            hands,
            batch_size,
            seeds,
            significance,
            out,
            md,
            fail_on_marginal,
            label,
            pretty,
        } => {
            let mut cfg = load_config(config.as_deref())?;

            if let Some(mode) = mode {
                cfg.mode = mode.parse()?;
            }
            if let Some(challenger) = challenger {
                cfg.challenger_path = challenger;
            }
            if let Some(baseline) = baseline {
                cfg.baseline_path = Some(baseline);
            }
            if let Some(server_cmd) = server_cmd {
                cfg.server_command =
                    shell_words::split(&server_cmd).context("invalid --server-cmd")?;
            }
            if let Some(hands) = hands {
                cfg.total_hands = hands;
            }
            if let Some(batch_size) = batch_size {
                cfg.batch_size = batch_size;
            }
            if let Some(seeds) = seeds {
                cfg.seeds = parse_seeds(&seeds)?;
            }
            if let Some(significance) = significance {
                cfg.significance_level = significance;
            }

            cfg.validate()?;
            validate_config_binaries(&cfg)?;

            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
                eprintln!("warning: failed to install ctrl-c handler: {err}");
            }

            let runner = FallbackRunner::new(
                EmbeddedRunner::new(UnavailableHost),
                SubprocessRunner::new(cfg.server_command.clone()),
            );
            let use_case = RunTestUseCase::new(runner, SystemClock);

            let outcome = match cfg.mode {
                TestMode::All => use_case.run_all_modes(&cfg, &cancel),
                single => use_case.execute(single, &cfg, &cancel).map(|r| vec![r]),
            };
            let results = match outcome {
                Ok(results) => results,
                Err(AppError::Cancelled) => {
                    eprintln!("botgate: cancelled");
                    std::process::exit(130);
                }
                Err(err) => return Err(err.into()),
            };

            let mut report = build_report(tool_info(), SystemClock.now_rfc3339(), results);
            report.labels = label.into_iter().collect();

            write_json(&out, &report, pretty)?;
            info!(report = %out.display(), "report written");

            if let Some(target) = md {
                let rendered = render_markdown(&report);
                if target == "-" {
                    print!("{rendered}");
                } else {
                    fs::write(&target, rendered).with_context(|| format!("write {target}"))?;
                }
            }

            match overall_recommendation(&report.results) {
                Recommendation::Reject => std::process::exit(2),
                Recommendation::Marginal if fail_on_marginal => std::process::exit(3),
                _ => Ok(()),
            }
        }

        Command::Md { input, out } => {
            let report: TestReport = read_json(&input)?;
            let rendered = render_markdown(&report);

            match out {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("write {}", path.display()))?;
                }
                None => {
                    print!("{rendered}");
                }
            }

            Ok(())
        }

        Command::Validate { config } => {
            let cfg = load_config(Some(&config))?;
            cfg.validate()?;
            validate_config_binaries(&cfg)?;

            println!("config ok");
            println!("  mode: {}", cfg.mode);
            println!("  challenger: {}", cfg.challenger_path);
            if let Some(baseline) = &cfg.baseline_path {
                println!("  baseline: {baseline}");
            }
            println!("  server: {}", shell_words::join(&cfg.server_command));
            println!(
                "  hands: {} per mode, in batches of {}",
                cfg.total_hands, cfg.batch_size
            );
            println!("  would run: {}", planned_modes(&cfg).join(", "));

            Ok(())
        }

        Command::Schema => {
            let schema = schemars::schema_for!(TestReport);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BOTGATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "botgate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TestConfig> {
    let Some(path) = path else {
        return Ok(TestConfig::default());
    };

    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let file: ConfigFile =
        toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(file.resolve()?)
}

/// Modes a run with this config would actually execute.
fn planned_modes(cfg: &TestConfig) -> Vec<&'static str> {
    let has_baseline = cfg
        .baseline_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());

    match cfg.mode {
        TestMode::All => TestMode::concrete()
            .into_iter()
            .filter(|m| has_baseline || !m.requires_baseline())
            .map(|m| m.as_str())
            .collect(),
        single => vec![single.as_str()],
    }
}

fn parse_seeds(raw: &str) -> anyhow::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .with_context(|| format!("invalid seed: {part}"))
        })
        .collect()
}

fn parse_key_val_string(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| "expected KEY=VALUE".to_string())?;
    Ok((k.to_string(), v.to_string()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let v =
        serde_json::from_slice(&bytes).with_context(|| format!("parse json {}", path.display()))?;
    Ok(v)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }

    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
