//! Guess generation mode: which candidate strategy drives a session.
//!
//! `SessionMode` is both the `--mode` CLI flag value and the `mode` field of
//! the persisted checkpoint, so new strategies can be added later without
//! breaking checkpoints written by older builds.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Candidate generation strategy for a session.
///
/// Defaults to [`SessionMode::PriorityQueue`], currently the only strategy.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Pre-terminals popped from a probability-ordered priority queue.
    #[default]
    #[value(name = "priority_queue", alias = "pq")]
    PriorityQueue,
}

impl SessionMode {
    /// Name of the checkpoint section that holds this mode's source state.
    #[must_use]
    pub fn section_name(self) -> &'static str {
        match self {
            Self::PriorityQueue => "priority_queue",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.section_name())
    }
}
