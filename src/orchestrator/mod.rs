//! Session orchestration modules.
//!
//! Covers the session control loop, the operator keystroke listener, and the
//! shutdown flag they share.

pub mod control_listener;
pub mod session_driver;
pub mod shutdown;

pub use control_listener::{ControlCommand, ControlListener};
pub use session_driver::{SessionDriver, SessionOutcome, SessionReport};
pub use shutdown::ShutdownSignal;
