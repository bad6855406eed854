//! Client facade over a dispatch implementation.

use crate::command::{execute_batch, execute_streaming, StreamableCommand};
use crate::core::adapter::CommandFuture;
use crate::core::operation::Dispatch;
use std::sync::Arc;

/// Entry point for executing commands against a cluster.
///
/// Holds the dispatch collaborator; all command state lives in the command
/// values themselves, so one client serves any number of concurrent
/// operations.
pub struct Client<C> {
    cluster: Arc<C>,
}

impl<C> Client<C> {
    pub fn new(cluster: C) -> Self {
        Self {
            cluster: Arc::new(cluster),
        }
    }

    pub fn cluster(&self) -> &Arc<C> {
        &self.cluster
    }

    /// Execute in batch mode: the returned future resolves to the fully
    /// aggregated response once the operation completes.
    pub fn execute<Cmd>(&self, command: &Cmd) -> Arc<CommandFuture<Cmd::Response, Cmd::Info>>
    where
        Cmd: StreamableCommand,
        C: Dispatch<Cmd::Elem> + Send + Sync + 'static,
    {
        execute_batch(&self.cluster, command)
    }

    /// Execute in streaming mode: the future's response is available
    /// immediately and wraps a live iterator over arriving elements.
    pub fn execute_streaming<Cmd>(
        &self,
        command: &Cmd,
    ) -> Arc<CommandFuture<Cmd::Response, Cmd::Info>>
    where
        Cmd: StreamableCommand,
        C: Dispatch<Cmd::Elem> + Send + Sync + 'static,
    {
        execute_streaming(&self.cluster, command)
    }
}

impl<C> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
        }
    }
}
