//! Command contract and the two execution entry points.
//!
//! Commands implement a small capability set instead of inheriting from a
//! template: build the wire operation, construct a streaming response, and
//! supply pure conversion hooks. The executors below compose those with the
//! core machinery for batch and streaming consumption of the same
//! operation.

pub mod index;
pub mod props;
pub mod resolver;

use crate::core::adapter::{adapt_batch, adapt_immediate, CancelHook, CommandFuture};
use crate::core::future::streaming_future;
use crate::core::iter::ChunkedIterator;
use crate::core::operation::{Dispatch, Operation};
use crate::core::CoreQueryResult;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-wait timeout applied when a command does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of a bucket: type plus bucket name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub bucket_type: String,
    pub bucket: String,
}

impl Namespace {
    pub const DEFAULT_TYPE: &'static str = "default";

    pub fn new(bucket_type: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            bucket_type: bucket_type.into(),
            bucket: bucket.into(),
        }
    }

    /// Bucket in the default type.
    pub fn bucket(bucket: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_TYPE, bucket)
    }
}

/// A command whose results may be consumed aggregated or as a live stream.
///
/// Implementations are immutable descriptions; `Clone` lets the executor
/// move a copy into the completion listener. All hooks are pure and invoked
/// at most once per execution.
pub trait StreamableCommand: Clone + Send + 'static {
    /// Decoded element type delivered by the dispatch layer.
    type Elem: Send + 'static;
    /// Public response type.
    type Response: Send + 'static;
    /// Public query-info type.
    type Info: Send + 'static;
    /// Core query-info type, captured at build time.
    type CoreInfo: Send + 'static;

    /// Build the wire-level request. `streaming` is a transport hint the
    /// dispatch collaborator may use to skip server-side aggregation.
    fn build_operation(&self, streaming: bool) -> Operation;

    /// Core-level description of this query, converted by
    /// [`convert_info`](Self::convert_info) when the operation finishes.
    fn core_info(&self) -> Self::CoreInfo;

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Construct the streaming-mode response around a live iterator.
    fn create_response(
        &self,
        timeout: Duration,
        stream: ChunkedIterator<Self::Elem>,
    ) -> Self::Response;

    /// Convert the aggregated core result into the public response.
    fn convert_response(
        &self,
        operation: &Operation,
        core: CoreQueryResult<Self::Elem>,
    ) -> Result<Self::Response>;

    /// Convert core query info into its public form.
    fn convert_info(core: Self::CoreInfo) -> Self::Info;
}

/// Backing store for a command response: exactly one of an aggregated
/// result or a live single-pass stream, never both.
#[derive(Debug)]
pub enum ResponseSource<E> {
    Aggregated {
        elements: Vec<E>,
        continuation: Option<Bytes>,
    },
    Streaming(Mutex<Option<ChunkedIterator<E>>>),
}

impl<E> ResponseSource<E> {
    pub fn aggregated(elements: Vec<E>, continuation: Option<Bytes>) -> Self {
        Self::Aggregated {
            elements,
            continuation,
        }
    }

    pub fn streaming(stream: ChunkedIterator<E>) -> Self {
        Self::Streaming(Mutex::new(Some(stream)))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Aggregated elements; iterating them on a streaming response is a
    /// contract violation, not silent degradation.
    pub fn elements(&self) -> Result<&[E]> {
        match self {
            Self::Aggregated { elements, .. } => Ok(elements),
            Self::Streaming(_) => Err(ClientError::UnsupportedOperation(
                "aggregated access on a streaming response",
            )),
        }
    }

    /// Final continuation token of an aggregated response. For a streaming
    /// response the token lives on the iterator after exhaustion.
    pub fn continuation(&self) -> Option<&Bytes> {
        match self {
            Self::Aggregated { continuation, .. } => continuation.as_ref(),
            Self::Streaming(_) => None,
        }
    }

    /// Take the live stream. Single-pass: a second take, or any take on an
    /// aggregated response, is `UnsupportedOperation`.
    pub fn stream(&self) -> Result<ChunkedIterator<E>> {
        match self {
            Self::Aggregated { .. } => Err(ClientError::UnsupportedOperation(
                "iteration is only supported for a streaming response",
            )),
            Self::Streaming(slot) => slot.lock().take().ok_or(ClientError::UnsupportedOperation(
                "streaming response can only be iterated once",
            )),
        }
    }
}

fn cancel_hook<E, C>(cluster: &Arc<C>, operation: &Operation, core: &Arc<crate::core::StreamingFuture<E>>) -> CancelHook
where
    E: Send + 'static,
    C: Dispatch<E> + Send + Sync + 'static,
{
    let cluster = cluster.clone();
    let operation = operation.clone();
    let core = core.clone();
    Box::new(move || {
        cluster.cancel(&operation);
        core.cancel();
    })
}

/// Batch execution: streaming disabled, future resolves to the aggregated
/// response once the underlying stream terminates. Aggregation shares the
/// queue machinery; it is just "drain the iterator and collect".
pub fn execute_batch<C, Cmd>(
    cluster: &Arc<C>,
    command: &Cmd,
) -> Arc<CommandFuture<Cmd::Response, Cmd::Info>>
where
    C: Dispatch<Cmd::Elem> + Send + Sync + 'static,
    Cmd: StreamableCommand,
{
    let operation = command.build_operation(false);
    debug!(op = operation.name, "dispatching batch operation");

    let (core, drain) = streaming_future();
    cluster.execute(&operation, core.clone());

    let iter = ChunkedIterator::new(drain, command.timeout());
    let hook = cancel_hook(cluster, &operation, &core);
    let cmd = command.clone();
    let op = operation.clone();
    adapt_batch(
        &core,
        iter,
        move |core_result| cmd.convert_response(&op, core_result),
        command.core_info(),
        Cmd::convert_info,
        hook,
    )
}

/// Streaming execution: streaming enabled, the iterator-backed response is
/// available from the returned future immediately, and the future still
/// completes when the stream terminates so callers can wait for side
/// effects without consuming the iterator.
pub fn execute_streaming<C, Cmd>(
    cluster: &Arc<C>,
    command: &Cmd,
) -> Arc<CommandFuture<Cmd::Response, Cmd::Info>>
where
    C: Dispatch<Cmd::Elem> + Send + Sync + 'static,
    Cmd: StreamableCommand,
{
    let operation = command.build_operation(true);
    debug!(op = operation.name, "dispatching streaming operation");

    let (core, drain) = streaming_future();
    cluster.execute(&operation, core.clone());

    let iter = ChunkedIterator::new(drain, command.timeout());
    let response = command.create_response(command.timeout(), iter);
    let hook = cancel_hook(cluster, &operation, &core);
    adapt_immediate(&core, response, command.core_info(), Cmd::convert_info, hook)
}
