//! Error types for the watchdog registry.

use thiserror::Error;

/// Errors returned by [`Watchdog`](crate::Watchdog) lifecycle operations.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// `start` was called more than once for the same watchdog.
    #[error("watchdog already started")]
    AlreadyStarted,

    /// The watchdog has been stopped and no longer accepts registrations.
    #[error("watchdog is stopped")]
    Stopped,
}
