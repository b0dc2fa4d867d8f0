//! Typevault CLI
//!
//! Unified command-line interface for:
//! - Checking a vault against its schema set (read-only)
//! - Fixing property blocks, locations and back-references (`--write`)
//! - Listing the resolved schema set
//!
//! Exit codes: 0 clean, 1 violations remain, 2 could not run at all.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use typevault_engine::{pipeline, RunMode, RunOptions, VaultOptions};
use typevault_schema::loader;

mod render;

#[derive(Parser)]
#[command(name = "typevault")]
#[command(
    author,
    version,
    about = "Schema-driven consistency for markdown vaults"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ReportArgs {
    /// Vault root directory
    vault: PathBuf,
    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Report format: text|json
    #[arg(long, default_value = "text")]
    format: String,
    /// Exit 0 even when violations remain
    #[arg(long)]
    no_fail: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every document against the schema set without touching disk.
    Check {
        #[command(flatten)]
        args: ReportArgs,
    },

    /// Compute repairs, relocations and back-references; apply them only
    /// with `--write`.
    Fix {
        #[command(flatten)]
        args: ReportArgs,
        /// Apply changes to disk (default is a dry run)
        #[arg(long)]
        write: bool,
    },

    /// List the resolved schema set.
    Schemas {
        /// Vault root directory
        vault: PathBuf,
        /// Output format: text|json
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_cli() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Check { args } => cmd_run(RunMode::Check, false, args),
        Commands::Fix { args, write } => cmd_run(RunMode::Fix, write, args),
        Commands::Schemas { vault, format } => cmd_schemas(&vault, &format),
    }
}

fn cmd_run(mode: RunMode, write: bool, args: ReportArgs) -> Result<ExitCode> {
    let options = RunOptions {
        mode,
        write,
        vault: VaultOptions::default(),
    };
    let report = pipeline::run(&args.vault, &options)?;

    let format = args.format.trim().to_ascii_lowercase();
    let rendered = match format.as_str() {
        "json" => serde_json::to_string_pretty(&report)?,
        "text" => render::render_report_text(&report),
        other => return Err(anyhow!("unknown --format `{other}` (expected json|text)")),
    };

    match &args.out {
        Some(path) => {
            fs::write(path, rendered)
                .map_err(|err| anyhow!("cannot write report to {}: {err}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if report.has_violations() && !args.no_fail {
        eprintln!(
            "{} {} violation(s) remain",
            "found".red().bold(),
            report.summary.violation_count
        );
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_schemas(vault: &PathBuf, format: &str) -> Result<ExitCode> {
    let options = VaultOptions::default();
    let set = loader::load_schema_dir(&vault.join(&options.schema_dir))?;

    let format = format.trim().to_ascii_lowercase();
    let rendered = match format.as_str() {
        "json" => serde_json::to_string_pretty(&set.records)?,
        "text" => render::render_schemas_text(&set),
        other => return Err(anyhow!("unknown --format `{other}` (expected json|text)")),
    };
    println!("{rendered}");
    Ok(ExitCode::SUCCESS)
}
