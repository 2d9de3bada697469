//! Candidate source abstraction.
//!
//! The [`CandidateSource`] trait decouples the session driver from the
//! strategy that ranks and expands candidates. Construction goes through a
//! [`SourceFactory`] so the driver decides whether a source is built fresh
//! or restored from a checkpoint, and never builds one when a resume fails.

pub mod priority_queue;

use std::fmt::{Display, Formatter};

use crate::mode::SessionMode;
use crate::models::Candidate;
use crate::persistence::CheckpointStore;

pub use priority_queue::{PreTerminal, PriorityQueueFactory, PriorityQueueSource};

/// The downstream guess consumer stopped accepting guesses.
///
/// This is an expected way for a session to end (typically every target
/// credential has been recovered) and is never treated as a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGone {
    /// What the sink reported when it refused the write.
    pub reason: String,
}

impl ConsumerGone {
    /// Build from the I/O error that closed the sink.
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

impl Display for ConsumerGone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer gone: {}", self.reason)
    }
}

impl std::error::Error for ConsumerGone {}

/// Produces candidates in non-increasing probability order and expands them
/// into concrete guesses.
pub trait CandidateSource: Send + 'static {
    /// Source-specific reference to the structure behind a candidate.
    type Descriptor: Display + Send;

    /// Pop the next most probable candidate, or `None` once exhausted.
    fn next_candidate(&mut self) -> Option<Candidate<Self::Descriptor>>;

    /// Emit every guess for `candidate` downstream and return how many were
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerGone`] if the downstream consumer refused a write.
    fn expand(
        &mut self,
        candidate: &Candidate<Self::Descriptor>,
    ) -> std::result::Result<u64, ConsumerGone>;

    /// Serialize enough state into `store` to resume without revisiting
    /// candidates popped before the most recent one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointIo` if the state cannot be serialized.
    fn save_state(&self, store: &mut CheckpointStore) -> crate::Result<()>;
}

/// Builds a [`CandidateSource`] either fresh or from a checkpoint.
pub trait SourceFactory {
    /// The source this factory builds.
    type Source: CandidateSource;

    /// Strategy identifier recorded in, and checked against, checkpoints.
    fn mode(&self) -> SessionMode;

    /// Build a source positioned before its first candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model cannot be prepared.
    fn create(self) -> crate::Result<Self::Source>;

    /// Build a source positioned where the checkpointed one left off.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CheckpointCorrupt` if the stored state is missing,
    /// malformed, or belongs to a different model.
    fn restore(self, store: &CheckpointStore) -> crate::Result<Self::Source>;
}
