#![forbid(unsafe_code)]

//! Resumable, operator-controlled password guess generation sessions.

pub mod config;
pub mod errors;
pub mod grammar;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod source;
pub mod status;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
