//! Chunk and terminal-signal types shared by producer and consumer sides.

use crate::error::ClientError;
use bytes::Bytes;

/// One batch of decoded result elements delivered as part of a longer
/// running query. Chunks for one operation are totally ordered by arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<E> {
    /// Decoded elements, in wire order.
    pub elements: Vec<E>,

    /// Opaque resume marker, carried by the final chunk when the server
    /// paginated the result.
    pub continuation: Option<Bytes>,

    /// Whether the producer marked this as the last chunk.
    pub is_final: bool,
}

impl<E> Chunk<E> {
    pub fn new(elements: Vec<E>) -> Self {
        Self {
            elements,
            continuation: None,
            is_final: false,
        }
    }

    /// Mark this chunk as final, optionally carrying a continuation token.
    pub fn finishing(elements: Vec<E>, continuation: Option<Bytes>) -> Self {
        Self {
            elements,
            continuation,
            is_final: true,
        }
    }
}

/// The single outcome recorded once per operation, ending chunk delivery.
///
/// Exactly one terminal is ever produced for a given operation, and it is
/// enqueued only after every chunk that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The stream finished normally.
    Success { continuation: Option<Bytes> },

    /// The remote side or transport failed mid-stream.
    Failure(ClientError),

    /// Explicitly cancelled before completion.
    Cancelled,
}

impl Terminal {
    pub fn is_success(&self) -> bool {
        matches!(self, Terminal::Success { .. })
    }

    /// The error a consumer should observe for this terminal, if any.
    pub fn as_error(&self) -> Option<ClientError> {
        match self {
            Terminal::Success { .. } => None,
            Terminal::Failure(err) => Some(err.clone()),
            Terminal::Cancelled => Some(ClientError::Cancelled),
        }
    }
}
