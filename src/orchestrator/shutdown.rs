//! Cooperative shutdown flag shared by the control listener and the driver.

use tokio_util::sync::{CancellationToken, DropGuard};

/// Raise-once request for the session loop to stop at its next iteration.
///
/// Clones share the same underlying flag. Raising is idempotent; once raised
/// the signal never resets. The driver polls [`ShutdownSignal::is_raised`]
/// between popping a candidate and expanding it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a signal that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn raise(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown has been requested.
    pub async fn raised(&self) {
        self.token.cancelled().await;
    }

    /// Guard that raises the signal when dropped, however its owner exits.
    #[must_use]
    pub fn raise_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}
