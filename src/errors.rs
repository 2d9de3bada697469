//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Downstream-consumer closure is deliberately absent: it is reported as
/// [`ConsumerGone`](crate::source::ConsumerGone) by the candidate source and
/// never travels through this type.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Grammar file could not be read or failed validation.
    Grammar(String),
    /// A resume was requested but no checkpoint file exists.
    CheckpointMissing(String),
    /// A checkpoint file exists but cannot be used to resume.
    CheckpointCorrupt(String),
    /// Writing a checkpoint to disk failed.
    CheckpointIo(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error means a resume attempt must stop at startup.
    #[must_use]
    pub fn is_resume_failure(&self) -> bool {
        matches!(self, Self::CheckpointMissing(_) | Self::CheckpointCorrupt(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Grammar(msg) => write!(f, "grammar: {msg}"),
            Self::CheckpointMissing(msg) => write!(f, "checkpoint missing: {msg}"),
            Self::CheckpointCorrupt(msg) => write!(f, "checkpoint corrupt: {msg}"),
            Self::CheckpointIo(msg) => write!(f, "checkpoint io: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
