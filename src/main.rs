use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use refmend::{RefLog, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refmend")]
#[command(about = "Reconcile a migration ruleset with the refs a conversion discovered")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Reference log written by the conversion tool
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Ruleset file to rewrite
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// TOML settings file (paths, repository name, exemptions)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log more (repeat for debug output)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Add refs from the log that the ruleset does not declare yet
    AddMissing,

    /// Move branches the log classifies as tags into tags blocks
    Tagify,

    /// Report disagreements between the ruleset and the log
    Check,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "refmend=warn",
        1 => "refmend=info",
        _ => "refmend=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries the rewritten ruleset
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if cli.log.is_some() {
        settings.log = cli.log.clone();
    }
    if cli.rules.is_some() {
        settings.rules = cli.rules.clone();
    }

    let log_path = settings
        .log
        .clone()
        .context("no reference log given (use --log or `log` in the settings file)")?;
    let rules_path = settings
        .rules
        .clone()
        .context("no ruleset given (use --rules or `rules` in the settings file)")?;

    let log = RefLog::read(&log_path)?;
    let rules = std::fs::read_to_string(&rules_path)
        .with_context(|| format!("failed to read ruleset '{}'", rules_path.display()))?;

    match cli.command {
        Command::AddMissing => {
            let text = refmend::add_missing_refs(&rules, &log, &settings)
                .with_context(|| format!("in ruleset '{}'", rules_path.display()))?;
            emit(cli.output.as_deref(), &text)?;
        }
        Command::Tagify => {
            let result = refmend::tagify(&rules, &log, &settings)
                .with_context(|| format!("in ruleset '{}'", rules_path.display()))?;
            emit(cli.output.as_deref(), &result.text)?;

            let report = toml::to_string_pretty(&result.unaccounted)
                .context("failed to render unaccounted refs")?;
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "refs not accounted for:")?;
            stderr.write_all(report.as_bytes())?;
        }
        Command::Check => {
            let found = refmend::audit(&rules, &log, &settings)
                .with_context(|| format!("in ruleset '{}'", rules_path.display()))?;
            let text: String = found.iter().map(|d| format!("{d}\n")).collect();
            emit(cli.output.as_deref(), &text)?;
        }
    }

    Ok(())
}

/// Write the finished output in one piece.
fn emit(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => refmend::write_atomic(path, text)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
