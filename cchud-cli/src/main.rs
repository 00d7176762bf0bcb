//! cchud CLI Entry Point
//!
//! Runs pmccabe on one source file, streams its output and prints the
//! complexity of every function, optionally re-running on every save.

mod surface;

use anyhow::{Context, Result};
use cchud_core::{AnalysisSession, AnalyzerConfig, DrainStep, Error as CoreError, Report, RenderSurface};
use cchud_realtime::{FileWatcher, WatchConfig, WatchEvent};
use cchud_utils::logging::{basic_config, LogLevel};
use cchud_utils::ConfigBuilder;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use surface::TerminalSurface;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cchud")]
#[command(about = "Cyclomatic complexity heads-up display for C and C++ sources")]
#[command(version)]
struct Cli {
    /// Source file to analyze
    file: PathBuf,

    /// Configuration file path (toml, json or yaml)
    #[arg(short = 'c', long, env = "CCHUD_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the pmccabe executable
    #[arg(long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Modified complexity above which a function is high
    #[arg(long, value_name = "N")]
    high: Option<u32>,

    /// Modified complexity above which a function is medium
    #[arg(long, value_name = "N")]
    medium: Option<u32>,

    /// Summarize which output lines fall in each bucket
    #[arg(long)]
    highlight: bool,

    /// Do not print per-function annotations
    #[arg(long)]
    no_annotations: bool,

    /// Print the report as JSON instead of the analyzer output
    #[arg(long)]
    json: bool,

    /// Re-run whenever the file changes
    #[arg(short = 'w', long)]
    watch: bool,

    /// Quiet period after a change before re-running (watch mode)
    #[arg(long, value_name = "MS", default_value_t = 300)]
    debounce_ms: u64,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

const EXIT_ANALYZER_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { LogLevel::Debug } else { LogLevel::Warning };
    if let Err(e) = basic_config(Some(level)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_CONFIGURATION)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let mut surface = TerminalSurface::new(&cli.file, cli.json);

    let mut session = match AnalysisSession::new(config) {
        Ok(session) => session,
        Err(e) => {
            surface.error_dialog(&e.to_string());
            return Ok(ExitCode::from(EXIT_CONFIGURATION));
        }
    };

    if !start_run(&mut session, &mut surface, &cli.file) {
        return Ok(ExitCode::from(EXIT_CONFIGURATION));
    }

    if cli.watch {
        watch(&cli, session, surface).await
    } else {
        run_once(&cli, session, surface).await
    }
}

/// Defaults, then the config file, then command-line flags
fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let config = ConfigBuilder::<AnalyzerConfig>::new()
        .load_file(cli.config.as_deref())
        .context("Failed to load configuration")?
        .apply(|config| {
            if let Some(executable) = &cli.executable {
                config.executable_path = executable.clone();
            }
            if let Some(high) = cli.high {
                config.high_complexity_threshold = high;
            }
            if let Some(medium) = cli.medium {
                config.medium_complexity_threshold = medium;
            }
            if cli.highlight {
                config.output_highlighting_enabled = true;
            }
            if cli.no_annotations {
                config.annotations_enabled = false;
            }
        })
        .build();

    debug!(?config, "effective configuration");
    Ok(config)
}

/// Start a run; `false` means the configuration prevents running at all
fn start_run(session: &mut AnalysisSession, surface: &mut TerminalSurface, file: &Path) -> bool {
    match session.run(file) {
        Ok(job) => {
            debug!(%job, file = %file.display(), "run started");
            true
        }
        // Already queued as output; rendered like a finished run.
        Err(e @ CoreError::SpawnFailure { .. }) => {
            debug!("{}", e);
            true
        }
        Err(e) => {
            surface.error_dialog(&e.to_string());
            false
        }
    }
}

fn finish_report(cli: &Cli, report: &Report) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

fn exit_code(succeeded: bool) -> ExitCode {
    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_ANALYZER_FAILED)
    }
}

async fn run_once(
    cli: &Cli,
    mut session: AnalysisSession,
    mut surface: TerminalSurface,
) -> Result<ExitCode> {
    let job = session.active_job().cloned();

    let report = tokio::select! {
        report = session.pump(&mut surface) => report,
        _ = tokio::signal::ctrl_c() => {
            if let Some(job) = &job {
                job.kill();
            }
            eprintln!("Interrupted");
            return Ok(exit_code(false));
        }
    };

    match report {
        Some(report) => {
            finish_report(cli, &report)?;
            Ok(exit_code(report.succeeded()))
        }
        None => Ok(exit_code(false)),
    }
}

async fn watch(
    cli: &Cli,
    mut session: AnalysisSession,
    mut surface: TerminalSurface,
) -> Result<ExitCode> {
    let mut watcher = FileWatcher::new(&cli.file)?.with_config(WatchConfig {
        debounce_ms: cli.debounce_ms,
    });
    let mut changes = watcher.start()?;
    let queue = session.queue();
    let mut last_succeeded = false;

    // One listener for the whole loop, so an interrupt that lands while
    // output is being drained is still seen by the next select.
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        loop {
            match session.drain_once(&mut surface) {
                DrainStep::Delivered => tokio::task::yield_now().await,
                DrainStep::Completed(report) => {
                    finish_report(cli, &report)?;
                    last_succeeded = report.succeeded();
                }
                DrainStep::Idle => break,
            }
        }

        tokio::select! {
            () = queue.wait_for_work() => {}
            change = changes.recv() => match change {
                Some(WatchEvent::Changed { path, timestamp }) => {
                    info!(path = %path.display(), %timestamp, "target changed");
                    surface.status_message(&format!("{} changed, re-running", cli.file.display()));
                    start_run(&mut session, &mut surface, &cli.file);
                }
                Some(WatchEvent::Error { message, .. }) => warn!("{}", message),
                None => break,
            },
            _ = &mut interrupt => {
                session.cancel();
                break;
            }
        }
    }

    watcher.stop();
    Ok(exit_code(last_succeeded))
}
