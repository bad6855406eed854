//! Producer-facing future for one dispatched operation.
//!
//! State machine: `Pending -> Receiving (0..n) -> {Completed | Failed |
//! Cancelled}`. The terminal transition is a one-shot atomic swap, so a race
//! between normal completion, a transport failure, and an explicit cancel
//! resolves to exactly one winner regardless of calling thread.

use crate::core::chunk::{Chunk, Terminal};
use crate::core::queue::{chunk_queue, ChunkDrain, ChunkQueue};
use crate::error::{ClientError, Result};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const PENDING: u8 = 0;
const RECEIVING: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;
const CANCELLED: u8 = 4;

/// Observable lifecycle of a [`StreamingFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Pending,
    Receiving,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            RECEIVING => Self::Receiving,
            COMPLETED => Self::Completed,
            FAILED => Self::Failed,
            CANCELLED => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

type Listener = Box<dyn FnOnce(&Terminal) + Send>;

struct FutureInner {
    terminal: Option<Terminal>,
    listeners: Vec<Listener>,
}

/// Shared state machine for one operation's chunk stream.
///
/// The dispatch implementation drives the producer methods from its own
/// context; consumers observe completion through listeners or the blocking
/// waits. The paired [`ChunkDrain`] (handed out at construction) is the
/// source of element visibility: every chunk pushed before the terminal is
/// observable there even after listeners have fired.
pub struct StreamingFuture<E> {
    state: AtomicU8,
    terminal_won: AtomicBool,
    queue: ChunkQueue<E>,
    inner: Mutex<FutureInner>,
    done: Condvar,
}

/// Create a future plus the drain its consumer will read from.
pub fn streaming_future<E>() -> (Arc<StreamingFuture<E>>, ChunkDrain<E>) {
    let (queue, drain) = chunk_queue();
    let future = Arc::new(StreamingFuture {
        state: AtomicU8::new(PENDING),
        terminal_won: AtomicBool::new(false),
        queue,
        inner: Mutex::new(FutureInner {
            terminal: None,
            listeners: Vec::new(),
        }),
        done: Condvar::new(),
    });
    (future, drain)
}

impl<E> StreamingFuture<E> {
    /// Producer: deliver one decoded chunk. Valid only before the terminal
    /// transition; late chunks are dropped.
    pub fn on_chunk(&self, chunk: Chunk<E>) -> bool {
        if self.terminal_won.load(Ordering::Acquire) {
            trace!("chunk after terminal transition dropped");
            return false;
        }
        let _ = self
            .state
            .compare_exchange(PENDING, RECEIVING, Ordering::AcqRel, Ordering::Relaxed);
        self.queue.push(chunk)
    }

    /// Producer: normal completion with the final continuation, if any.
    pub fn on_complete(&self, continuation: Option<Bytes>) -> bool {
        self.finish(Terminal::Success { continuation }, COMPLETED)
    }

    /// Producer: the transport or remote side failed.
    pub fn on_failure(&self, cause: ClientError) -> bool {
        self.finish(Terminal::Failure(cause), FAILED)
    }

    /// Request the cancelled terminal state. No-op returning false when a
    /// terminal state was already reached.
    pub fn cancel(&self) -> bool {
        self.finish(Terminal::Cancelled, CANCELLED)
    }

    fn finish(&self, terminal: Terminal, state: u8) -> bool {
        if self.terminal_won.swap(true, Ordering::AcqRel) {
            trace!(?terminal, "late terminal signal lost the transition race");
            return false;
        }
        // Close the queue first: the terminal lands behind every chunk the
        // consumer has yet to drain.
        self.queue.close(terminal.clone());
        self.state.store(state, Ordering::Release);
        debug!(state = ?StreamState::from_u8(state), "stream reached terminal state");

        let listeners = {
            let mut inner = self.inner.lock();
            inner.terminal = Some(terminal.clone());
            self.done.notify_all();
            std::mem::take(&mut inner.listeners)
        };
        for listener in listeners {
            listener(&terminal);
        }
        true
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// The recorded terminal signal, if the stream has ended.
    pub fn terminal(&self) -> Option<Terminal> {
        self.inner.lock().terminal.clone()
    }

    /// Register a callback fired exactly once with the terminal outcome.
    /// If the future is already terminal the callback fires synchronously.
    pub fn add_listener(&self, listener: impl FnOnce(&Terminal) + Send + 'static) {
        let terminal = {
            let mut inner = self.inner.lock();
            match inner.terminal.clone() {
                Some(terminal) => terminal,
                None => {
                    inner.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        listener(&terminal);
    }

    /// Block until the terminal signal is recorded.
    pub fn wait(&self) -> Terminal {
        let mut inner = self.inner.lock();
        loop {
            if let Some(terminal) = &inner.terminal {
                return terminal.clone();
            }
            self.done.wait(&mut inner);
        }
    }

    /// Block until the terminal signal is recorded or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Terminal> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(terminal) = &inner.terminal {
                return Ok(terminal.clone());
            }
            if self.done.wait_until(&mut inner, deadline).timed_out() {
                return Err(ClientError::Timeout(timeout));
            }
        }
    }
}
