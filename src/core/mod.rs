//! Core execution machinery: chunk hand-off, blocking iteration, the
//! one-shot streaming future, and the response adapter.
//!
//! ```text
//! dispatch (producer)          consumer
//! +-----------------+   chunks   +------------------+
//! | StreamingFuture | ---------> | ChunkedIterator  |
//! |  on_chunk/...   |  terminal  |  has_next/next   |
//! +-----------------+ ---------> +------------------+
//!          |  listener
//!          v
//! +-----------------+
//! | CommandFuture   |  (batch result or immediate streaming handle)
//! +-----------------+
//! ```

pub mod adapter;
pub mod chunk;
pub mod future;
pub mod iter;
pub mod operation;
pub mod queue;

pub use adapter::{adapt_batch, adapt_immediate, CommandFuture, CoreQueryResult};
pub use chunk::{Chunk, Terminal};
pub use future::{streaming_future, StreamState, StreamingFuture};
pub use iter::ChunkedIterator;
pub use operation::{Dispatch, Operation, OperationFlags};
pub use queue::{chunk_queue, ChunkDrain, ChunkQueue, InterruptHandle, Slot};
