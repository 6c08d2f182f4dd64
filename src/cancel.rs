//! Cooperative cancellation: a token checked at every suspension point
//! a search iteration or memento fetch passes through (between retries,
//! between pages, after each redirect hop).
//!
//! Wraps `tokio_util::sync::CancellationToken`, the standard minimal
//! building block the `tokio` ecosystem uses for exactly this purpose,
//! rather than hand-rolling an atomic flag.

use crate::error::Error;
use tokio_util::sync::CancellationToken;

/// A cancellation handle shared between a caller and an in-flight search
/// iteration or memento fetch.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(CancellationToken);

impl Cancellation {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Signal cancellation. Safe to call more than once.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Check this token at a suspension point, returning
    /// `Error::Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<(), Error> {
        if self.0.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
