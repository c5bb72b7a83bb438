#![forbid(unsafe_code)]

//! `radacct-janitor`: closes hung RADIUS accounting sessions.
//!
//! Layers configuration, connects to the accounting store, runs one
//! detect-and-repair sweep, and exits with a status describing the
//! outcome.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use radacct_janitor::config::{redact_url, LogVerbosity};
use radacct_janitor::models::repair::RepairSummary;
use radacct_janitor::persistence::db;
use radacct_janitor::{repair, AppError, JanitorConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "radacct-janitor",
    about = "Close hung RADIUS accounting sessions",
    version,
    long_about = None
)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store URL (`mysql://…` or `sqlite:…`); overrides `DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,

    /// Minutes without an accounting update before an open session is hung.
    #[arg(long, allow_negative_numbers = true)]
    threshold_minutes: Option<i64>,

    /// Report the sessions that would be closed without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Trace SQL statements and bound parameters.
    #[arg(long)]
    debug: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    summary_json: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let config = load_config(&args);
    let verbosity = config
        .as_ref()
        .map_or(LogVerbosity::Normal, JanitorConfig::verbosity);
    if let Err(err) = init_tracing(args.log_format, verbosity) {
        eprintln!("{err}");
        return ExitCode::from(err.exit_code());
    }

    let outcome = config.and_then(|config| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| AppError::Io(format!("failed to build tokio runtime: {err}")))?
            .block_on(run(config, args.summary_json))
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, exit_code = err.exit_code(), "radacct-janitor run failed");
            ExitCode::from(err.exit_code())
        }
    }
}

/// File, then environment, then command-line flags.
fn load_config(args: &Cli) -> Result<JanitorConfig> {
    let mut config = match &args.config {
        Some(path) => JanitorConfig::load_from_path(path)?,
        None => JanitorConfig::default(),
    };
    config.apply_env()?;

    if let Some(url) = &args.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(threshold) = args.threshold_minutes {
        config.threshold_minutes = threshold;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if args.debug {
        config.debug = true;
    }
    Ok(config)
}

async fn run(mut config: JanitorConfig, summary_json: bool) -> Result<()> {
    // ── Validate before touching the store ──────────────
    config.validate()?;
    config.load_credentials().await?;
    let repair_config = config.repair_config()?;
    info!(
        threshold_minutes = repair_config.threshold_minutes.get(),
        dry_run = repair_config.dry_run,
        target = %config.database.url.as_deref().map_or_else(
            || config.database.host.clone().unwrap_or_default(),
            redact_url,
        ),
        "radacct-janitor run starting"
    );

    // ── Connect ─────────────────────────────────────────
    let db = Arc::new(db::connect(&config.database, config.connect_timeout()).await?);
    info!(backend = db.backend(), "store connected");

    // ── Sweep ───────────────────────────────────────────
    let result = repair::sweep(Arc::clone(&db), &repair_config).await;
    db.close().await;
    let summary = result?;

    if summary_json {
        print_summary(&summary)?;
    }
    Ok(())
}

fn print_summary(summary: &RepairSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|err| AppError::Io(format!("failed to encode summary: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").map_err(|err| AppError::Io(format!("failed to write summary: {err}")))
}

fn init_tracing(log_format: LogFormat, verbosity: LogVerbosity) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
