#![forbid(unsafe_code)]

//! `pcfg-session`: password guess generation session binary.
//!
//! Loads the grammar, starts or resumes a session, streams guesses to
//! stdout, and listens for operator keystrokes on stdin. All diagnostics go
//! to stderr.

use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pcfg_session::config::{ConfigOverrides, SessionConfig};
use pcfg_session::grammar::Grammar;
use pcfg_session::mode::SessionMode;
use pcfg_session::orchestrator::{
    ControlListener, SessionDriver, SessionOutcome, SessionReport, ShutdownSignal,
};
use pcfg_session::source::PriorityQueueFactory;
use pcfg_session::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "pcfg-session",
    about = "Generate password guesses from a probabilistic grammar",
    version,
    long_about = None
)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Grammar file to generate guesses from.
    #[arg(short, long)]
    grammar: Option<PathBuf>,

    /// Session name; the checkpoint is saved as `<session>.sav`.
    #[arg(short, long)]
    session: Option<String>,

    /// Directory holding session checkpoints.
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Resume the named session from its checkpoint.
    #[arg(short, long)]
    load: bool,

    /// Candidate generation strategy.
    #[arg(long, value_enum)]
    mode: Option<SessionMode>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_control: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    // The control listener may still be parked on a stdin read.
    runtime.shutdown_background();

    let report = result.inspect_err(|err| error!(%err, "session failed to start"))?;
    match report.outcome {
        SessionOutcome::Exhausted => {
            info!(session_id = %report.session_id, "done processing the grammar");
        }
        SessionOutcome::ShutDown { checkpoint_saved } => {
            if checkpoint_saved {
                info!(session_id = %report.session_id, "session saved, exiting");
            } else {
                warn!(session_id = %report.session_id, "session could not be saved, exiting");
            }
        }
        SessionOutcome::ConsumerGone { .. } => {
            info!(session_id = %report.session_id, "guess consumer closed, exiting");
        }
    }
    info!(
        candidates = report.counters.candidates_processed,
        guesses = report.counters.guesses_emitted,
        coverage = report.counters.probability_coverage,
        "session summary"
    );
    Ok(())
}

async fn run(args: Cli) -> Result<SessionReport> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_path(path)?,
        None => SessionConfig::default(),
    };
    let config = config.apply_overrides(ConfigOverrides {
        grammar_path: args.grammar,
        session_dir: args.session_dir,
        session_name: args.session,
        mode: args.mode,
        disable_control: args.no_control,
    })?;

    let grammar = Arc::new(Grammar::load_from_path(config.grammar_path()?)?);
    info!(
        grammar = grammar.name(),
        structures = grammar.structures().len(),
        slots = grammar.slots().len(),
        "grammar loaded"
    );

    // ── Shutdown wiring ─────────────────────────────────
    let shutdown = ShutdownSignal::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        interrupt_signal().await;
        warn!("interrupt received, stopping after the current candidate");
        interrupt.raise();
    });

    // ── Run the session ─────────────────────────────────
    let checkpoint_path = config.checkpoint_path();
    info!(checkpoint = %checkpoint_path.display(), resume = args.load, "session configured");

    match config.mode {
        SessionMode::PriorityQueue => {
            let sink = BufWriter::new(std::io::stdout());
            let factory = PriorityQueueFactory::new(grammar, sink);
            let mut driver =
                SessionDriver::new(factory, checkpoint_path).with_shutdown_signal(shutdown);
            if config.control_listener {
                driver = driver.with_control_listener(ControlListener::new(
                    tokio::io::stdin(),
                    tokio::io::stderr(),
                ));
            }
            driver.run(args.load).await
        }
    }
}

async fn interrupt_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the guess stream.
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
