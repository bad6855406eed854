//! Ordered hand-off buffer between the network producer and one consumer.
//!
//! Built on an unbounded crossbeam channel: chunks flow through in push
//! order and the terminal signal is just the last message, so a consumer can
//! never observe the terminal before a chunk that preceded it. The queue is
//! unbounded by choice; a consumer that never drains lets it grow, but a
//! bounded queue would let one slow consumer stall the producer context.

use crate::core::chunk::{Chunk, Terminal};
use crate::error::{ClientError, Result};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// One message in the hand-off channel.
#[derive(Debug)]
pub enum Slot<E> {
    Chunk(Chunk<E>),
    Terminal(Terminal),
}

/// Create a connected queue/drain pair for one operation.
///
/// `ChunkDrain` is deliberately not `Clone`: a queue has at most one
/// consumer, and ownership enforces that statically.
pub fn chunk_queue<E>() -> (ChunkQueue<E>, ChunkDrain<E>) {
    let (tx, rx) = unbounded();
    let (wake_tx, wake_rx) = unbounded();
    let interrupt = InterruptHandle {
        flag: Arc::new(AtomicBool::new(false)),
        wake: wake_tx,
    };
    (
        ChunkQueue {
            tx,
            closed: AtomicBool::new(false),
        },
        ChunkDrain {
            rx,
            wake_rx,
            interrupt,
        },
    )
}

/// Producer side: push chunks, then close with exactly one terminal.
pub struct ChunkQueue<E> {
    tx: Sender<Slot<E>>,
    closed: AtomicBool,
}

impl<E> ChunkQueue<E> {
    /// Append a chunk. Returns false (and drops the chunk) once the queue
    /// has been closed; a chunk racing `close` on another thread may still
    /// land behind the terminal, where the drain never reads it.
    pub fn push(&self, chunk: Chunk<E>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            trace!(elements = chunk.elements.len(), "chunk after close dropped");
            return false;
        }
        self.tx.send(Slot::Chunk(chunk)).is_ok()
    }

    /// Record the terminal signal. Idempotent: only the first close wins and
    /// enqueues the terminal, later calls return false and change nothing.
    pub fn close(&self, terminal: Terminal) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            trace!(?terminal, "duplicate close ignored");
            return false;
        }
        let _ = self.tx.send(Slot::Terminal(terminal));
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Consumer side: blocking reads of chunks until the terminal signal.
#[derive(Debug)]
pub struct ChunkDrain<E> {
    rx: Receiver<Slot<E>>,
    wake_rx: Receiver<()>,
    interrupt: InterruptHandle,
}

impl<E> ChunkDrain<E> {
    /// Handle for interrupting a blocked [`recv`](Self::recv) from another
    /// thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Block until the next chunk or the terminal signal is available.
    ///
    /// Fails with `Timeout` once `timeout` elapses, with `Interrupted` if
    /// the interrupt handle fires (or is already set), and with
    /// `Disconnected` if the producer vanished without closing the queue.
    pub fn recv(&self, timeout: Duration) -> Result<Slot<E>> {
        loop {
            if self.interrupt.is_interrupted() {
                return Err(ClientError::Interrupted);
            }
            select! {
                recv(self.rx) -> slot => {
                    return slot.map_err(|_| ClientError::Disconnected);
                }
                recv(self.wake_rx) -> _ => {
                    // Re-check: a cleared interrupt leaves a stale wake-up.
                    if self.interrupt.is_interrupted() {
                        return Err(ClientError::Interrupted);
                    }
                }
                default(timeout) => {
                    return Err(ClientError::Timeout(timeout));
                }
            }
        }
    }
}

/// Wakes a consumer parked in [`ChunkDrain::recv`].
///
/// The interrupt is sticky: once fired, reads keep failing with
/// `Interrupted` until [`clear`](Self::clear) re-arms the drain. Chunks
/// buffered before the interrupt are not lost.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    wake: Sender<()>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            let _ = self.wake.send(());
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn chunks_arrive_in_push_order() {
        let (queue, drain) = chunk_queue();
        queue.push(Chunk::new(vec![1, 2]));
        queue.push(Chunk::new(vec![3]));
        queue.close(Terminal::Success { continuation: None });

        match drain.recv(WAIT).unwrap() {
            Slot::Chunk(c) => assert_eq!(c.elements, vec![1, 2]),
            other => panic!("expected chunk, got {other:?}"),
        }
        match drain.recv(WAIT).unwrap() {
            Slot::Chunk(c) => assert_eq!(c.elements, vec![3]),
            other => panic!("expected chunk, got {other:?}"),
        }
        match drain.recv(WAIT).unwrap() {
            Slot::Terminal(t) => assert!(t.is_success()),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn close_is_idempotent_and_first_wins() {
        let (queue, drain) = chunk_queue::<i32>();
        assert!(queue.close(Terminal::Cancelled));
        assert!(!queue.close(Terminal::Success { continuation: None }));

        match drain.recv(WAIT).unwrap() {
            Slot::Terminal(Terminal::Cancelled) => {}
            other => panic!("expected cancelled terminal, got {other:?}"),
        }
    }

    #[test]
    fn push_after_close_is_dropped() {
        let (queue, drain) = chunk_queue();
        queue.push(Chunk::new(vec![1]));
        queue.close(Terminal::Success { continuation: None });
        assert!(!queue.push(Chunk::new(vec![2])));

        match drain.recv(WAIT).unwrap() {
            Slot::Chunk(c) => assert_eq!(c.elements, vec![1]),
            other => panic!("expected chunk, got {other:?}"),
        }
        match drain.recv(WAIT).unwrap() {
            Slot::Terminal(t) => assert!(t.is_success()),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn interrupt_wakes_blocked_recv() {
        let (_queue, drain) = chunk_queue::<i32>();
        let handle = drain.interrupt_handle();

        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.interrupt();
        });

        let started = Instant::now();
        let err = drain.recv(WAIT).unwrap_err();
        assert_eq!(err, ClientError::Interrupted);
        assert!(started.elapsed() < WAIT);
        assert!(drain.interrupt_handle().is_interrupted());
        waker.join().unwrap();
    }

    #[test]
    fn cleared_interrupt_keeps_buffered_chunks() {
        let (queue, drain) = chunk_queue();
        queue.push(Chunk::new(vec![7]));

        let handle = drain.interrupt_handle();
        handle.interrupt();
        assert_eq!(drain.recv(WAIT).unwrap_err(), ClientError::Interrupted);

        handle.clear();
        match drain.recv(WAIT).unwrap() {
            Slot::Chunk(c) => assert_eq!(c.elements, vec![7]),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn recv_times_out_when_empty() {
        let (_queue, drain) = chunk_queue::<i32>();
        let timeout = Duration::from_millis(30);
        assert_eq!(
            drain.recv(timeout).unwrap_err(),
            ClientError::Timeout(timeout)
        );
    }

    #[test]
    fn dropped_producer_without_close_is_disconnected() {
        let (queue, drain) = chunk_queue::<i32>();
        drop(queue);
        assert_eq!(drain.recv(WAIT).unwrap_err(), ClientError::Disconnected);
    }
}
