//! Bucket-properties fetch command.
//!
//! A single-element query: the server answers with at most one property
//! set. Multiple property sets are treated like unresolved siblings and
//! fail fast through the conflict-resolver contract.

use crate::command::resolver::{ConflictResolver, DefaultResolver};
use crate::command::{Namespace, ResponseSource, StreamableCommand, DEFAULT_TIMEOUT};
use crate::core::adapter::CoreQueryResult;
use crate::core::iter::ChunkedIterator;
use crate::core::operation::{Operation, OperationFlags};
use crate::error::{ClientError, Result};
use bytes::{BufMut, BytesMut};
use std::time::Duration;

/// Raw property set as decoded off the wire; unset fields fall back to
/// server defaults on conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreBucketProps {
    pub n_val: Option<u32>,
    pub allow_mult: Option<bool>,
    pub last_write_wins: Option<bool>,
    pub backend: Option<String>,
}

/// Public property set with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketProps {
    pub n_val: u32,
    pub allow_mult: bool,
    pub last_write_wins: bool,
    pub backend: String,
}

impl From<CoreBucketProps> for BucketProps {
    fn from(core: CoreBucketProps) -> Self {
        Self {
            n_val: core.n_val.unwrap_or(3),
            allow_mult: core.allow_mult.unwrap_or(false),
            last_write_wins: core.last_write_wins.unwrap_or(false),
            backend: core.backend.unwrap_or_else(|| "default".to_string()),
        }
    }
}

/// Fetches the properties of one bucket.
#[derive(Debug, Clone)]
pub struct FetchBucketProps {
    namespace: Namespace,
    timeout: Duration,
}

impl FetchBucketProps {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response to a [`FetchBucketProps`] command.
pub struct PropsResponse {
    source: ResponseSource<CoreBucketProps>,
}

impl PropsResponse {
    /// The fetched properties with defaults applied, resolved through the
    /// fail-fast [`DefaultResolver`].
    pub fn props(&self) -> Result<BucketProps> {
        self.props_with_resolver(&DefaultResolver)
    }

    /// Resolve with a caller-supplied strategy when the server can return
    /// more than one property set.
    pub fn props_with_resolver(
        &self,
        resolver: &impl ConflictResolver<CoreBucketProps>,
    ) -> Result<BucketProps> {
        let siblings = self.source.elements()?.to_vec();
        match resolver.resolve(siblings)? {
            Some(core) => Ok(core.into()),
            None => Err(ClientError::Protocol(
                "server returned no bucket properties".into(),
            )),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.source.is_streaming()
    }

    /// Live stream of raw property sets (streaming mode only).
    pub fn stream(&self) -> Result<ChunkedIterator<CoreBucketProps>> {
        self.source.stream()
    }
}

impl StreamableCommand for FetchBucketProps {
    type Elem = CoreBucketProps;
    type Response = PropsResponse;
    type Info = Namespace;
    type CoreInfo = Namespace;

    fn build_operation(&self, streaming: bool) -> Operation {
        let flags = if streaming {
            OperationFlags::STREAM
        } else {
            OperationFlags::empty()
        };
        let mut buf = BytesMut::new();
        buf.put_u16(self.namespace.bucket_type.len() as u16);
        buf.put_slice(self.namespace.bucket_type.as_bytes());
        buf.put_u16(self.namespace.bucket.len() as u16);
        buf.put_slice(self.namespace.bucket.as_bytes());
        Operation::new("fetch-bucket-props", flags, buf.freeze())
    }

    fn core_info(&self) -> Namespace {
        self.namespace.clone()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn create_response(
        &self,
        _timeout: Duration,
        stream: ChunkedIterator<CoreBucketProps>,
    ) -> PropsResponse {
        PropsResponse {
            source: ResponseSource::streaming(stream),
        }
    }

    fn convert_response(
        &self,
        _operation: &Operation,
        core: CoreQueryResult<CoreBucketProps>,
    ) -> Result<PropsResponse> {
        Ok(PropsResponse {
            source: ResponseSource::aggregated(core.elements, core.continuation),
        })
    }

    fn convert_info(core: Namespace) -> Namespace {
        core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial_props() -> CoreBucketProps {
        CoreBucketProps {
            n_val: Some(5),
            allow_mult: None,
            last_write_wins: None,
            backend: None,
        }
    }

    #[test]
    fn defaults_are_applied_on_conversion() {
        let props: BucketProps = partial_props().into();
        assert_eq!(props.n_val, 5);
        assert!(!props.allow_mult);
        assert!(!props.last_write_wins);
        assert_eq!(props.backend, "default");
    }

    #[test]
    fn single_property_set_resolves() {
        let cmd = FetchBucketProps::new(Namespace::bucket("accounts"));
        let response = cmd
            .convert_response(
                &cmd.build_operation(false),
                CoreQueryResult {
                    elements: vec![partial_props()],
                    continuation: None,
                },
            )
            .unwrap();
        assert_eq!(response.props().unwrap().n_val, 5);
    }

    #[test]
    fn sibling_property_sets_fail_fast() {
        let cmd = FetchBucketProps::new(Namespace::bucket("accounts"));
        let response = cmd
            .convert_response(
                &cmd.build_operation(false),
                CoreQueryResult {
                    elements: vec![partial_props(), partial_props()],
                    continuation: None,
                },
            )
            .unwrap();
        assert!(matches!(
            response.props().unwrap_err(),
            ClientError::IllegalUsage(_)
        ));
    }

    #[test]
    fn empty_result_is_a_protocol_error() {
        let cmd = FetchBucketProps::new(Namespace::bucket("accounts"));
        let response = cmd
            .convert_response(
                &cmd.build_operation(false),
                CoreQueryResult {
                    elements: vec![],
                    continuation: None,
                },
            )
            .unwrap();
        assert!(matches!(
            response.props().unwrap_err(),
            ClientError::Protocol(_)
        ));
    }
}
