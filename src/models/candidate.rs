//! Candidate model produced by a candidate source.

use std::fmt::{Display, Formatter};

/// A ranked structural placeholder waiting to be expanded into guesses.
///
/// Sources hand candidates out in non-increasing `probability` order. The
/// driver owns each candidate for exactly one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<D> {
    /// Source-specific reference to the grammar structure.
    pub descriptor: D,
    /// Probability of each guess this candidate expands into.
    pub probability: f64,
}

impl<D> Candidate<D> {
    /// Construct a candidate.
    #[must_use]
    pub fn new(descriptor: D, probability: f64) -> Self {
        Self {
            descriptor,
            probability,
        }
    }
}

impl<D: Display> Display for Candidate<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (p={:e})", self.descriptor, self.probability)
    }
}
