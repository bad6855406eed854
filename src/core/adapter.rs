//! Bridges a core streaming future to the consumer-facing command future.
//!
//! The adapter registers as a listener on the [`StreamingFuture`] and, on
//! the terminal signal, applies the command's conversion hooks exactly once.
//! The hooks run inside the core future's one-shot transition, so concurrent
//! completion and cancellation cannot both convert. Element visibility is
//! owed to the chunk queue, not the listener: an iterator already reading
//! the stream can observe every chunk enqueued before the terminal even if
//! the listener fires first.

use crate::core::chunk::Terminal;
use crate::core::future::StreamingFuture;
use crate::core::iter::ChunkedIterator;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Aggregated core-level outcome of a fully drained stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreQueryResult<E> {
    pub elements: Vec<E>,
    pub continuation: Option<Bytes>,
}

/// Hook run by [`CommandFuture::cancel`]: dispatch-level cancellation plus
/// forcing the core future's cancelled state.
pub type CancelHook = Box<dyn Fn() + Send + Sync>;
type Listener = Box<dyn FnOnce(&Terminal) + Send>;

struct CommandInner<R, I> {
    response: Option<Result<R>>,
    response_taken: bool,
    info: Option<I>,
    terminal: Option<Terminal>,
    listeners: Vec<Listener>,
}

/// Public-facing, single-completion future for one executed command.
///
/// In batch mode the response slot fills when the underlying stream reaches
/// a terminal state; in streaming mode it is pre-filled so the caller gets
/// the live iterator-backed response immediately and may still wait on this
/// future for completion side effects.
pub struct CommandFuture<R, I> {
    inner: Mutex<CommandInner<R, I>>,
    done: Condvar,
    cancel_hook: CancelHook,
}

impl<R, I> CommandFuture<R, I> {
    fn new(response: Option<Result<R>>, cancel_hook: CancelHook) -> Self {
        Self {
            inner: Mutex::new(CommandInner {
                response,
                response_taken: false,
                info: None,
                terminal: None,
                listeners: Vec::new(),
            }),
            done: Condvar::new(),
            cancel_hook,
        }
    }

    /// Take the response, blocking until it is available. One-shot: a
    /// second take fails with `UnsupportedOperation`.
    pub fn response(&self) -> Result<R> {
        self.response_deadline(None)
    }

    /// Like [`response`](Self::response) with a deadline. On expiry the
    /// in-flight operation is cancelled best-effort and `Timeout` returned.
    pub fn response_timeout(&self, timeout: Duration) -> Result<R> {
        self.response_deadline(Some(timeout))
    }

    fn response_deadline(&self, timeout: Option<Duration>) -> Result<R> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();
        loop {
            if inner.response_taken {
                return Err(ClientError::UnsupportedOperation(
                    "command response already taken",
                ));
            }
            if let Some(outcome) = inner.response.take() {
                inner.response_taken = true;
                return outcome;
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut inner, deadline).timed_out() {
                        drop(inner);
                        self.cancel();
                        return Err(ClientError::Timeout(timeout.unwrap_or_default()));
                    }
                }
                None => self.done.wait(&mut inner),
            }
        }
    }

    /// Block until the underlying stream reaches its terminal state.
    pub fn wait(&self) -> Terminal {
        let mut inner = self.inner.lock();
        loop {
            if let Some(terminal) = &inner.terminal {
                return terminal.clone();
            }
            self.done.wait(&mut inner);
        }
    }

    /// Block until terminal or `timeout` elapses.
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

    /// Request cancellation: invokes the dispatch cancel hook and forces the
    /// core future into its cancelled state. No-op returning false once the
    /// future is already terminal.
    pub fn cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }
        (self.cancel_hook)();
        true
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().terminal.is_some()
    }

    /// Terminal outcome, if the operation has finished.
    pub fn terminal(&self) -> Option<Terminal> {
        self.inner.lock().terminal.clone()
    }

    /// Converted query info, available once the operation has finished.
    pub fn query_info(&self) -> Option<I>
    where
        I: Clone,
    {
        self.inner.lock().info.clone()
    }

    /// Register a callback invoked exactly once with the terminal outcome;
    /// fires synchronously if the future is already complete.
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

    /// Idempotent completion; only the first call records anything.
    fn complete(&self, terminal: Terminal, response: Option<Result<R>>, info: I) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.terminal.is_some() {
                debug!("duplicate command-future completion ignored");
                return;
            }
            inner.terminal = Some(terminal.clone());
            if let Some(response) = response {
                inner.response = Some(response);
            }
            inner.info = Some(info);
            self.done.notify_all();
            std::mem::take(&mut inner.listeners)
        };
        for listener in listeners {
            listener(&terminal);
        }
    }
}

/// Drain a stream whose terminal is already enqueued; never blocks past the
/// buffered messages.
fn collect_all<E>(iter: &mut ChunkedIterator<E>) -> Result<CoreQueryResult<E>> {
    let mut elements = Vec::new();
    loop {
        match iter.try_next()? {
            Some(element) => elements.push(element),
            None => {
                return Ok(CoreQueryResult {
                    elements,
                    continuation: iter.continuation().cloned(),
                })
            }
        }
    }
}

/// Wire a batch-mode command future: on terminal success the (fully
/// buffered) stream is drained, aggregated, and converted exactly once.
pub fn adapt_batch<E, R, I, CI, FR, FI>(
    core: &Arc<StreamingFuture<E>>,
    mut iter: ChunkedIterator<E>,
    convert_response: FR,
    core_info: CI,
    convert_info: FI,
    cancel_hook: CancelHook,
) -> Arc<CommandFuture<R, I>>
where
    E: Send + 'static,
    R: Send + 'static,
    I: Send + 'static,
    CI: Send + 'static,
    FR: FnOnce(CoreQueryResult<E>) -> Result<R> + Send + 'static,
    FI: FnOnce(CI) -> I + Send + 'static,
{
    let future = Arc::new(CommandFuture::new(None, cancel_hook));
    let adapted = future.clone();
    core.add_listener(move |terminal| {
        let outcome = match terminal {
            Terminal::Success { .. } => collect_all(&mut iter).and_then(convert_response),
            Terminal::Failure(cause) => Err(cause.clone()),
            Terminal::Cancelled => Err(ClientError::Cancelled),
        };
        adapted.complete(terminal.clone(), Some(outcome), convert_info(core_info));
    });
    future
}

/// Wire a streaming-mode command future: the iterator-backed response is
/// available immediately; completion (terminal, info, listeners) follows
/// once the underlying stream terminates.
pub fn adapt_immediate<E, R, I, CI, FI>(
    core: &Arc<StreamingFuture<E>>,
    response: R,
    core_info: CI,
    convert_info: FI,
    cancel_hook: CancelHook,
) -> Arc<CommandFuture<R, I>>
where
    E: Send + 'static,
    R: Send + 'static,
    I: Send + 'static,
    CI: Send + 'static,
    FI: FnOnce(CI) -> I + Send + 'static,
{
    let future = Arc::new(CommandFuture::new(Some(Ok(response)), cancel_hook));
    let adapted = future.clone();
    core.add_listener(move |terminal| {
        adapted.complete(terminal.clone(), None, convert_info(core_info));
    });
    future
}
