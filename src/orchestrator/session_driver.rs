//! Session control loop with checkpointing and cooperative shutdown.
//!
//! The driver builds or restores the candidate source and progress tracker,
//! starts the optional [`ControlListener`], then loops:
//!
//! 1. pop the next candidate; stop when the source is exhausted,
//! 2. if shutdown was requested, checkpoint and stop; the candidate just
//!    popped is left for the resumed session,
//! 3. record the candidate,
//! 4. expand it and account for the guesses, stopping if the downstream
//!    consumer has gone away.
//!
//! Checkpoints are written only when a fresh session starts and when a
//! shutdown is honoured, so a persisted checkpoint always describes a point
//! between two fully expanded candidates.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::control_listener::ControlListener;
use super::shutdown::ShutdownSignal;
use crate::mode::SessionMode;
use crate::persistence::CheckpointStore;
use crate::source::{CandidateSource, SourceFactory};
use crate::status::{ProgressCounters, ProgressTracker};
use crate::{AppError, Result};

/// Checkpoint section describing the session itself.
pub const SESSION_SECTION: &str = "session";

/// Lifecycle of one driver run.
///
/// `Created -> Running -> {Exhausted, ShuttingDown, ConsumerGone} -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    /// Source and tracker are being built or restored.
    Created,
    /// The control loop is consuming candidates.
    Running,
    /// The source ran out of candidates.
    Exhausted,
    /// A shutdown request is being honoured.
    ShuttingDown,
    /// The downstream consumer refused further guesses.
    ConsumerGone,
    /// The loop has exited.
    Terminated,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every candidate was expanded.
    Exhausted,
    /// The operator asked to stop; a checkpoint write was attempted.
    ShutDown {
        /// Whether the checkpoint reached disk.
        checkpoint_saved: bool,
    },
    /// The downstream consumer closed.
    ConsumerGone {
        /// What the consumer reported.
        reason: String,
    },
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Identifier kept across resumes of the same session.
    pub session_id: String,
    /// Why the run stopped.
    pub outcome: SessionOutcome,
    /// Counters at the moment the loop exited.
    pub counters: ProgressCounters,
}

/// The `session` checkpoint section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Identifier kept across resumes.
    pub session_id: String,
    /// Strategy that produced the checkpoint.
    pub mode: SessionMode,
    /// When the session was first started.
    pub created_at: DateTime<Utc>,
    /// When the checkpoint was last written.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Record for a brand-new session.
    #[must_use]
    pub fn new(mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            mode,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owns one guess generation run from start (or resume) to termination.
pub struct SessionDriver<F> {
    factory: F,
    checkpoint_path: PathBuf,
    shutdown: ShutdownSignal,
    listener: Option<ControlListener>,
}

impl<F: SourceFactory> SessionDriver<F> {
    /// Driver building its source from `factory` and checkpointing to
    /// `checkpoint_path`.
    #[must_use]
    pub fn new(factory: F, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            checkpoint_path: checkpoint_path.into(),
            shutdown: ShutdownSignal::new(),
            listener: None,
        }
    }

    /// Share an externally owned shutdown signal (e.g. one raised on SIGINT).
    #[must_use]
    pub fn with_shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Start `listener` alongside the loop.
    #[must_use]
    pub fn with_control_listener(mut self, listener: ControlListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Handle to this driver's shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run the session until exhaustion, shutdown, or consumer loss.
    ///
    /// A fresh session (`resume == false`) writes an initial, empty-progress
    /// checkpoint before any guess is generated. A resumed session restores
    /// progress and source state from the checkpoint file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointMissing` or `AppError::CheckpointCorrupt`
    /// if `resume` is set and the checkpoint cannot be used; no source is
    /// built in that case. Returns the factory's error if the source cannot
    /// be built. Checkpoint write failures are logged, not returned.
    pub async fn run(self, resume: bool) -> Result<SessionReport> {
        let mode = self.factory.mode();
        let span = info_span!("session", %mode, resume);

        let (record, progress, source) = {
            let _guard = span.enter();
            debug!(phase = ?SessionPhase::Created, "session phase");
            if resume {
                restore_session(self.factory, &self.checkpoint_path)?
            } else {
                start_session(self.factory)?
            }
        };

        let progress = Arc::new(progress);
        if let Some(listener) = self.listener {
            // Not joined: the listener is abandoned when the loop exits.
            drop(listener.spawn(Arc::clone(&progress), self.shutdown.clone()));
        }

        let mut worker = SessionWorker {
            source,
            progress: Arc::clone(&progress),
            shutdown: self.shutdown,
            record,
            checkpoint_path: self.checkpoint_path,
            phase: SessionPhase::Created,
        };

        let session_id = worker.record.session_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            if !resume {
                // A crash before the first candidate still leaves a
                // resumable, empty-progress checkpoint.
                if let Err(err) = worker.checkpoint() {
                    error!(%err, "failed to write initial checkpoint");
                }
            }
            let outcome = worker.run_loop();
            worker.enter(SessionPhase::Terminated);
            outcome
        })
        .await
        .map_err(|err| AppError::Io(format!("session worker failed: {err}")))?;

        debug!(?outcome, "session finished");
        Ok(SessionReport {
            session_id,
            outcome,
            counters: progress.counters(),
        })
    }
}

fn start_session<F: SourceFactory>(
    factory: F,
) -> Result<(SessionRecord, ProgressTracker, F::Source)> {
    let record = SessionRecord::new(factory.mode());
    let source = factory.create()?;
    info!(session_id = %record.session_id, "starting new session");
    Ok((record, ProgressTracker::new(), source))
}

fn restore_session<F: SourceFactory>(
    factory: F,
    checkpoint_path: &std::path::Path,
) -> Result<(SessionRecord, ProgressTracker, F::Source)> {
    let mode = factory.mode();
    let store = CheckpointStore::read(checkpoint_path)?;

    let record: SessionRecord = store.section(SESSION_SECTION)?;
    if record.mode != mode {
        return Err(AppError::CheckpointCorrupt(format!(
            "checkpoint was written in {} mode, session requested {mode}",
            record.mode
        )));
    }
    store.ensure_known_sections(&[SESSION_SECTION, ProgressTracker::SECTION, mode.section_name()])?;

    let progress = ProgressTracker::restore(&store)?;
    let source = factory.restore(&store)?;
    let counters = progress.counters();
    info!(
        session_id = %record.session_id,
        candidates = counters.candidates_processed,
        guesses = counters.guesses_emitted,
        coverage = counters.probability_coverage,
        "restored saved progress"
    );
    Ok((record, progress, source))
}

/// State moved onto the blocking worker thread.
struct SessionWorker<S> {
    source: S,
    progress: Arc<ProgressTracker>,
    shutdown: ShutdownSignal,
    record: SessionRecord,
    checkpoint_path: PathBuf,
    phase: SessionPhase,
}

impl<S: CandidateSource> SessionWorker<S> {
    fn enter(&mut self, next: SessionPhase) {
        debug_assert!(
            matches!(
                (self.phase, next),
                (SessionPhase::Created, SessionPhase::Running)
                    | (
                        SessionPhase::Running,
                        SessionPhase::Exhausted
                            | SessionPhase::ShuttingDown
                            | SessionPhase::ConsumerGone
                    )
                    | (
                        SessionPhase::Exhausted
                            | SessionPhase::ShuttingDown
                            | SessionPhase::ConsumerGone,
                        SessionPhase::Terminated
                    )
            ),
            "illegal session phase transition {:?} -> {next:?}",
            self.phase
        );
        debug!(from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }

    fn run_loop(&mut self) -> SessionOutcome {
        self.enter(SessionPhase::Running);
        info!("generating guesses");

        loop {
            let Some(candidate) = self.source.next_candidate() else {
                self.enter(SessionPhase::Exhausted);
                info!("grammar exhausted, no more guesses to generate");
                return SessionOutcome::Exhausted;
            };

            // Checked after the pop so the checkpoint covers every expanded
            // candidate and leaves this one for the resumed session.
            if self.shutdown.is_raised() {
                self.enter(SessionPhase::ShuttingDown);
                info!("saving session");
                let checkpoint_saved = match self.checkpoint() {
                    Ok(()) => true,
                    Err(err) => {
                        error!(%err, path = %self.checkpoint_path.display(), "failed to save session");
                        false
                    }
                };
                return SessionOutcome::ShutDown { checkpoint_saved };
            }

            self.progress.record_candidate(&candidate);

            match self.source.expand(&candidate) {
                Ok(guess_count) => {
                    self.progress
                        .record_expansion(guess_count, candidate.probability);
                }
                Err(gone) => {
                    self.enter(SessionPhase::ConsumerGone);
                    warn!(reason = %gone.reason, "downstream consumer stopped accepting guesses");
                    return SessionOutcome::ConsumerGone {
                        reason: gone.reason,
                    };
                }
            }
        }
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.record.updated_at = Utc::now();
        let mut store = CheckpointStore::new();
        store.set_section(SESSION_SECTION, &self.record)?;
        self.progress.save_state(&mut store)?;
        self.source.save_state(&mut store)?;
        store.write(&self.checkpoint_path)
    }
}
