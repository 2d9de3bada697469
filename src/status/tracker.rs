//! Session progress counters with checkpoint persistence.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::Candidate;
use crate::persistence::CheckpointStore;
use crate::Result;

/// Durable counters; this is exactly what the `progress` section holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProgressCounters {
    /// Candidates popped and committed to expansion.
    pub candidates_processed: u64,
    /// Concrete guesses written downstream.
    pub guesses_emitted: u64,
    /// Cumulative probability mass of all emitted guesses.
    pub probability_coverage: f64,
}

/// The most recently recorded candidate, kept for status display only.
#[derive(Debug, Clone, PartialEq)]
pub struct LastCandidate {
    /// Human-readable descriptor of the candidate.
    pub descriptor: String,
    /// Per-guess probability of the candidate.
    pub probability: f64,
}

/// Point-in-time copy of the tracker, safe to render without holding a lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Durable counters.
    pub counters: ProgressCounters,
    /// Guesses emitted by this process (excludes restored progress).
    pub guesses_this_run: u64,
    /// Last candidate recorded, if any.
    pub last_candidate: Option<LastCandidate>,
    /// Time since this process started the session.
    pub elapsed: Duration,
}

#[derive(Debug)]
struct TrackerState {
    counters: ProgressCounters,
    last_candidate: Option<LastCandidate>,
}

/// Shared progress accumulator for one session run.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    baseline_guesses: u64,
    state: Mutex<TrackerState>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Checkpoint section holding [`ProgressCounters`].
    pub const SECTION: &'static str = "progress";

    /// Fresh tracker with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::from_counters(ProgressCounters::default())
    }

    /// Tracker seeded from previously persisted counters.
    #[must_use]
    pub fn from_counters(counters: ProgressCounters) -> Self {
        Self {
            started: Instant::now(),
            baseline_guesses: counters.guesses_emitted,
            state: Mutex::new(TrackerState {
                counters,
                last_candidate: None,
            }),
        }
    }

    /// Restore counters from the `progress` section of a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` if the section is missing,
    /// malformed, or holds a negative or non-finite coverage value.
    pub fn restore(store: &CheckpointStore) -> Result<Self> {
        let counters: ProgressCounters = store.section(Self::SECTION)?;
        if !counters.probability_coverage.is_finite() || counters.probability_coverage < 0.0 {
            return Err(crate::AppError::CheckpointCorrupt(format!(
                "invalid probability_coverage {}",
                counters.probability_coverage
            )));
        }
        Ok(Self::from_counters(counters))
    }

    /// Count `candidate` as processed and remember it for status display.
    pub fn record_candidate<D: Display>(&self, candidate: &Candidate<D>) {
        let last = LastCandidate {
            descriptor: candidate.descriptor.to_string(),
            probability: candidate.probability,
        };
        let mut state = self.lock();
        state.counters.candidates_processed += 1;
        state.last_candidate = Some(last);
    }

    /// Account for a completed expansion of `guess_count` guesses at
    /// `probability` each.
    #[allow(clippy::cast_precision_loss)] // guess counts stay far below 2^53
    pub fn record_expansion(&self, guess_count: u64, probability: f64) {
        let mut state = self.lock();
        state.counters.guesses_emitted += guess_count;
        state.counters.probability_coverage += probability * guess_count as f64;
    }

    /// Current durable counters.
    #[must_use]
    pub fn counters(&self) -> ProgressCounters {
        self.lock().counters
    }

    /// Copy of the full tracker state for rendering.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            counters: state.counters,
            guesses_this_run: state
                .counters
                .guesses_emitted
                .saturating_sub(self.baseline_guesses),
            last_candidate: state.last_candidate.clone(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Write the counters into the `progress` section of `store`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointIo` if the counters cannot be serialized.
    pub fn save_state(&self, store: &mut CheckpointStore) -> Result<()> {
        store.set_section(Self::SECTION, &self.counters())
    }

    /// Multi-line status report.
    #[must_use]
    pub fn render(&self) -> String {
        super::render::status_report(&self.snapshot())
    }

    /// Explanation of the fields in [`ProgressTracker::render`].
    #[must_use]
    #[allow(clippy::unused_self)] // paired with `render` for listener call sites
    pub fn render_help(&self) -> String {
        super::render::help_text()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Counters are plain scalars; a panicked writer cannot leave them torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
