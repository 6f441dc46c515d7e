//! Errors in the library.
use thiserror::Error;

/// Domain errors raised by the training loop and algorithms built on it.
#[derive(Debug, Error)]
pub enum RlError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: expected {0}")]
    RecordValueTypeError(String),

    /// Invalid configuration, detected before training starts.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The replay buffer cannot provide the requested batch.
    #[error("Replay buffer holds {available} transitions, {requested} requested")]
    InsufficientTransitions {
        /// Requested batch size.
        requested: usize,

        /// Number of transitions in the buffer.
        available: usize,
    },

    /// A loss became NaN or infinite.
    #[error("Non-finite loss: {0}")]
    NonFiniteLoss(String),
}
