//! Dispatch errors.

use thiserror::Error;

use crate::capabilities::ValueKind;
use crate::resolver::ResolutionError;

/// Errors returned by [`Dispatcher::invoke`](super::Dispatcher::invoke) and by
/// member bodies.
///
/// Resolution failures and errors raised by bodies are passed through
/// unchanged, including across nested calls.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No implementation could be bound.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Arguments do not match the member signature.
    #[error("Argument mismatch for {member}: {reason}")]
    ArgumentMismatch { member: String, reason: String },

    /// A body produced a value of the wrong kind.
    #[error("{member} returned {found}, expected {expected}")]
    ReturnMismatch {
        member: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Nested member calls went deeper than the configured limit.
    #[error("Call depth limit {limit} exceeded at {member}")]
    RecursionLimit { member: String, limit: usize },

    /// Error raised by a member body.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl DispatchError {
    /// The resolution failure behind this error, if any.
    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            DispatchError::Resolution(err) => Some(err),
            _ => None,
        }
    }
}
