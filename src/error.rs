//! Error taxonomy for the streaming engine.
//!
//! # Design Decisions
//! - State violations are recoverable: the connection catches them itself
//!   and converts them into a forced `errored` transition.
//! - A missing async-response capability is fatal; nothing has been sent
//!   yet, so the connection aborts before committing a response.
//! - A registry miss is a configuration error; the default registry always
//!   carries a catch-all handler, so this only fires on hand-built registries.

use thiserror::Error;

use crate::connection::State;

/// Errors surfaced by the connection engine.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// An operation was invoked outside its required state set.
    #[error("'{operation}' not allowed: requires one of {allowed:?}, connection is {current:?}")]
    StateConstraint {
        /// The operation that was attempted.
        operation: &'static str,
        /// States in which the operation is legal.
        allowed: &'static [State],
        /// State the connection was actually in.
        current: State,
    },

    /// The host environment cannot defer delivery of the response.
    #[error("host does not expose an asynchronous response capability")]
    UnsupportedServer,

    /// No registered handler accepted the request.
    #[error("no registered stream handler accepted the request")]
    HandlerNotFound,
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_constraint_names_the_violation() {
        let err = StreamError::StateConstraint {
            operation: "set_status",
            allowed: &[State::New],
            current: State::Open,
        };
        let msg = err.to_string();
        assert!(msg.contains("set_status"));
        assert!(msg.contains("New"));
        assert!(msg.contains("Open"));
    }
}
