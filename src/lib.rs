//! Client execution layer for chunk-streamed storage queries.
//!
//! A dispatched operation delivers its result as an ordered sequence of
//! chunks followed by exactly one terminal signal. This crate lets one such
//! operation serve two consumption contracts:
//!
//! - **batch**: [`Client::execute`] returns a future that resolves once, to
//!   the fully aggregated response;
//! - **streaming**: [`Client::execute_streaming`] returns immediately with a
//!   response wrapping a live, blocking iterator over elements as they
//!   arrive, while the same future can still be awaited for completion.
//!
//! Wire encoding of specific query types, connection pooling, and cluster
//! dispatch are external collaborators behind the [`core::Dispatch`] seam.
//!
//! ```no_run
//! use silt::command::index::IndexQuery;
//! use silt::command::Namespace;
//! use bytes::Bytes;
//!
//! # fn run<C>(client: silt::Client<C>) -> Result<(), silt::ClientError>
//! # where C: silt::core::Dispatch<silt::command::index::IndexEntry> + Send + Sync + 'static {
//! let query = IndexQuery::range(
//!     Namespace::bucket("users"),
//!     "email_bin",
//!     Bytes::from_static(b"a"),
//!     Bytes::from_static(b"m"),
//! )
//! .build();
//!
//! let future = client.execute_streaming(&query);
//! let response = future.response()?;
//! for entry in response.stream()? {
//!     println!("{:?}", entry?.object_key);
//! }
//! future.wait();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod core;
pub mod error;

pub use crate::client::Client;
pub use crate::command::{Namespace, StreamableCommand};
pub use crate::core::{Chunk, CommandFuture, StreamingFuture, Terminal};
pub use crate::error::ClientError;
