//! Durable session state.
//!
//! Checkpoints are single TOML documents holding one named section per
//! stateful component.

pub mod checkpoint_store;

pub use checkpoint_store::{CheckpointStore, CHECKPOINT_VERSION};
