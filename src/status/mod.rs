//! Progress accounting and operator-facing status reports.
//!
//! [`ProgressTracker`] is written by the session loop on every candidate and
//! read by the control listener on demand. A read may lag the writer by one
//! iteration; that is fine for an informational display.

pub mod render;
pub mod tracker;

pub use tracker::{LastCandidate, ProgressCounters, ProgressSnapshot, ProgressTracker};
