//! Error types for the link.
//!
//! Task-context operations (producer submission, configuration, the consumer's
//! sink) return these to the caller. Worker-context failures have nowhere to
//! propagate to, so the state machine logs them and reports them through its
//! step outcome instead.

use crate::link::Direction;
use thiserror::Error;

/// Alias for `Result<T, LinkError>`.
pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Submission is larger than the configured single-call limit.
    /// Rejected before anything is queued.
    #[error("payload of {len} bytes exceeds the {max}-byte submission limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// The outbound stream could not take the whole payload within the
    /// blocking budget. The first `queued` bytes stay in the stream.
    #[error("outbound stream accepted only {queued} of {len} bytes")]
    EnqueueFailed { queued: usize, len: usize },

    /// A chunk pop/push moved fewer bytes than the chunk size demanded.
    #[error("short {direction} transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer {
        direction: Direction,
        expected: usize,
        actual: usize,
    },

    /// The bus implementation reported a failed exchange.
    #[error("bus error: {0}")]
    Bus(String),

    /// A wire frame could not be decoded.
    #[error("malformed bus frame: {0}")]
    Frame(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Errors raised inside a state-machine invocation rather than by a caller.
    pub fn is_transfer_fault(&self) -> bool {
        matches!(
            self,
            LinkError::ShortTransfer { .. } | LinkError::Bus(_) | LinkError::Frame(_)
        )
    }
}
