//! Error taxonomy for the execution layer.
//!
//! Terminal signals from the dispatch layer are never retried here; this
//! crate's only job is to deliver them faithfully, exactly once, to the
//! iterator and the adapted future.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by command execution, iteration, and future waits.
///
/// Cloneable so a single terminal signal can be observed by both the batch
/// future and an in-progress iterator read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The remote side or transport reported an error.
    #[error("remote error: {0}")]
    Protocol(String),

    /// The consumer was interrupted while blocked waiting for data.
    /// Recoverable: chunks buffered before the interrupt stay drainable.
    #[error("interrupted while waiting for stream data")]
    Interrupted,

    /// The operation was cancelled before a normal terminal signal.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking wait exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The requested access does not match the response mode, e.g. iterating
    /// an aggregated response or re-iterating a single-pass stream.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A command-level misuse detected before or after dispatch.
    #[error("illegal usage: {0}")]
    IllegalUsage(String),

    /// The producer went away without recording a terminal signal.
    #[error("stream closed before a terminal signal was recorded")]
    Disconnected,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
