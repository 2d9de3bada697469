//! Domain model module declarations.

pub mod candidate;

pub use candidate::Candidate;
