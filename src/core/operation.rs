//! Built operations and the cluster dispatch seam.

use crate::core::future::StreamingFuture;
use bytes::Bytes;
use std::sync::Arc;

bitflags::bitflags! {
    /// Transport hints recorded on a built operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OperationFlags: u8 {
        /// Deliver results incrementally; without it the transport may
        /// aggregate server-side before responding.
        const STREAM = 1 << 0;
        /// Return indexed terms alongside object keys.
        const RETURN_TERMS = 1 << 1;
        /// Server-side pagination ordering requested.
        const PAGINATION_SORT = 1 << 2;
    }
}

/// Immutable description of one wire-level request.
///
/// Built by a command for exactly one execution; the payload is opaque to
/// this layer and owned by the dispatch collaborator from there on.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Short operation name, for logs only.
    pub name: &'static str,
    pub flags: OperationFlags,
    /// Encoded request payload.
    pub request: Bytes,
}

impl Operation {
    pub fn new(name: &'static str, flags: OperationFlags, request: Bytes) -> Self {
        Self {
            name,
            flags,
            request,
        }
    }

    /// Whether incremental delivery was requested at build time.
    pub fn is_streaming(&self) -> bool {
        self.flags.contains(OperationFlags::STREAM)
    }
}

/// The cluster seam: dispatches built operations and drives their streams.
///
/// The executor constructs the [`StreamingFuture`]/drain pair and hands the
/// producer half to `execute`; the implementation delivers zero or more
/// chunks followed by exactly one terminal signal, in wire order, from its
/// own producer context. Errors from this layer are delivered as the
/// terminal signal, never retried here.
pub trait Dispatch<E>: Send + Sync {
    fn execute(&self, operation: &Operation, future: Arc<StreamingFuture<E>>);

    /// Best-effort cancellation of an in-flight operation. The default does
    /// nothing; the executor separately forces the future's cancelled state.
    fn cancel(&self, operation: &Operation) {
        let _ = operation;
    }
}
