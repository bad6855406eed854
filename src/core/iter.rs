//! Pull-based blocking iterator over a chunk drain.
//!
//! Exposes individual elements, not whole chunks; blocks only when the
//! queue is momentarily empty. Forward-only and single-pass.

use crate::core::chunk::Terminal;
use crate::core::queue::{ChunkDrain, InterruptHandle, Slot};
use crate::error::{ClientError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

/// Blocking cursor over one operation's chunk stream.
///
/// Chunks enqueued before a `Failure` or `Cancelled` terminal are still
/// delivered; the terminal error surfaces only once the buffer is
/// exhausted. The per-wait `timeout` bounds every individual blocking read.
#[derive(Debug)]
pub struct ChunkedIterator<E> {
    drain: ChunkDrain<E>,
    buffer: VecDeque<E>,
    continuation: Option<Bytes>,
    terminal: Option<Terminal>,
    timeout: Duration,
    error_emitted: bool,
}

impl<E> ChunkedIterator<E> {
    pub fn new(drain: ChunkDrain<E>, timeout: Duration) -> Self {
        Self {
            drain,
            buffer: VecDeque::new(),
            continuation: None,
            terminal: None,
            timeout,
            error_emitted: false,
        }
    }

    /// Handle for interrupting a read blocked in this iterator.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.drain.interrupt_handle()
    }

    /// Pull one message off the drain into local state.
    fn pull(&mut self) -> Result<()> {
        match self.drain.recv(self.timeout)? {
            Slot::Chunk(chunk) => {
                if let Some(token) = chunk.continuation {
                    self.continuation = Some(token);
                }
                self.buffer.extend(chunk.elements);
            }
            Slot::Terminal(terminal) => {
                if let Terminal::Success {
                    continuation: Some(token),
                } = &terminal
                {
                    self.continuation = Some(token.clone());
                }
                self.terminal = Some(terminal);
            }
        }
        Ok(())
    }

    /// Whether another element exists or can be obtained by blocking.
    ///
    /// `Ok(false)` only once the terminal is `Success` or `Cancelled` and no
    /// buffered element remains; a `Failure` terminal is reported as its
    /// cause.
    pub fn has_next(&mut self) -> Result<bool> {
        loop {
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            match &self.terminal {
                Some(Terminal::Failure(err)) => return Err(err.clone()),
                Some(_) => return Ok(false),
                None => self.pull()?,
            }
        }
    }

    /// Next element, blocking while the queue is momentarily empty.
    ///
    /// `Ok(None)` on normal exhaustion. A cancellation reached with an
    /// empty buffer is `Err(Cancelled)`, a failure terminal is its cause,
    /// and an interrupt while parked is `Err(Interrupted)` (sticky until
    /// the handle is cleared; buffered elements are not lost).
    pub fn try_next(&mut self) -> Result<Option<E>> {
        loop {
            if let Some(element) = self.buffer.pop_front() {
                return Ok(Some(element));
            }
            match &self.terminal {
                Some(Terminal::Success { .. }) => return Ok(None),
                Some(Terminal::Cancelled) => return Err(ClientError::Cancelled),
                Some(Terminal::Failure(err)) => return Err(err.clone()),
                None => self.pull()?,
            }
        }
    }

    /// Continuation token from the final chunk (or the success terminal),
    /// if the server returned one. Meaningful once the stream is exhausted.
    pub fn continuation(&self) -> Option<&Bytes> {
        self.continuation.as_ref()
    }

    /// Terminal signal observed so far, if any.
    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }
}

impl<E> Iterator for ChunkedIterator<E> {
    type Item = Result<E>;

    /// Fused after the first error so `for` loops over a failed or
    /// cancelled stream terminate instead of re-raising forever.
    fn next(&mut self) -> Option<Self::Item> {
        if self.error_emitted {
            return None;
        }
        match self.try_next() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => None,
            Err(err) => {
                self.error_emitted = true;
                Some(Err(err))
            }
        }
    }
}
