//! Errors raised while setting up observers or flushing the change set.

use thiserror::Error;

/// Errors that can occur while setting up or flushing observers.
///
/// Errors raised by subscribers themselves are not represented here: a
/// panicking subscriber unwinds through the notification and aborts the current
/// flush.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservationError {
    /// The change set kept being dirtied by its own flushes.
    #[error(
        "Change set did not settle after {passes} flush passes; {pending} \
         trackables are still queued."
    )]
    FlushLimitExceeded {
        /// The number of passes that were run.
        passes: usize,
        /// The number of trackables left in the queue.
        pending: usize,
    },
    /// A property can only be observed by dirty checking, and the dirty-check
    /// settings forbid it.
    #[error(
        "Property `{key}` cannot be intercepted, and dirty checking has been \
         configured to fail."
    )]
    DirtyCheckRequired {
        /// The key of the property.
        key: String,
    },
    /// An expression was used as an assignment target, but it cannot be
    /// assigned to.
    #[error("Expression is not assignable.")]
    NotAssignable,
}
