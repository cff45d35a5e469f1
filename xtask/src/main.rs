use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::Path;

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for botgate")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for results, reports, and config.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: String,

        /// Compare against the committed schemas instead of writing.
        #[arg(long, default_value_t = false)]
        check: bool,
    },

    /// Run the "usual" repo checks (fmt, clippy, test, schema).
    Ci,

    /// Run mutation testing via cargo-mutants (must be installed).
    Mutants {
        /// Extra args forwarded to cargo-mutants
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

/// Versioned schema files and the types they are generated from.
fn schema_targets() -> Vec<(&'static str, serde_json::Value)> {
    fn to_value<T: serde::Serialize>(schema: T) -> serde_json::Value {
        serde_json::to_value(schema).expect("schema serializes")
    }

    vec![
        (
            "botgate.result.v1.schema.json",
            to_value(schema_for!(botgate_types::TestResult)),
        ),
        (
            "botgate.report.v1.schema.json",
            to_value(schema_for!(botgate_types::TestReport)),
        ),
        (
            "botgate.config.v1.schema.json",
            to_value(schema_for!(botgate_types::ConfigFile)),
        ),
    ]
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir, check } => {
            if check {
                cmd_schema_check(Path::new(&out_dir))
            } else {
                cmd_schema_write(Path::new(&out_dir))
            }
        }
        Command::Ci => cmd_ci(),
        Command::Mutants { args } => cmd_mutants(args),
    }
}

fn cmd_schema_write(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;

    for (name, schema) in schema_targets() {
        let path = out_dir.join(name);
        let json = render(&schema)?;
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Fails when a committed schema no longer matches the types, so CI catches
/// wire-format changes that skipped `xtask schema`.
fn cmd_schema_check(out_dir: &Path) -> anyhow::Result<()> {
    let mut drifted = Vec::new();
    for (name, schema) in schema_targets() {
        let path = out_dir.join(name);
        let expected = render(&schema)?;
        let committed =
            fs::read(&path).with_context(|| format!("read {} (run `xtask schema` once?)", path.display()))?;
        if committed != expected {
            drifted.push(name);
        }
    }
    if !drifted.is_empty() {
        bail!(
            "schema drift in {}; regenerate with `cargo run -p xtask -- schema`",
            drifted.join(", ")
        );
    }
    println!("schemas up to date");
    Ok(())
}

fn render(schema: &serde_json::Value) -> anyhow::Result<Vec<u8>> {
    let mut json = serde_json::to_vec_pretty(schema)?;
    json.push(b'\n');
    Ok(json)
}

fn cmd_ci() -> anyhow::Result<()> {
    run("cargo", &["fmt", "--all", "--", "--check"])?;
    run(
        "cargo",
        &["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
    )?;
    run("cargo", &["test", "--all"])?;
    run("cargo", &["run", "-p", "xtask", "--", "schema"])?;
    Ok(())
}

fn cmd_mutants(args: Vec<String>) -> anyhow::Result<()> {
    // Typical usage: `cargo install cargo-mutants` then `cargo run -p xtask -- mutants`.
    let mut cmd = std::process::Command::new("cargo");
    cmd.arg("mutants");
    for a in args {
        cmd.arg(a);
    }
    let status = cmd.status().context("running cargo mutants")?;
    if !status.success() {
        bail!("cargo mutants failed: {status}");
    }
    Ok(())
}

fn run(bin: &str, args: &[&str]) -> anyhow::Result<()> {
    let status = std::process::Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("running {bin}"))?;
    if !status.success() {
        bail!("{bin} failed: {status}");
    }
    Ok(())
}
