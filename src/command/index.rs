//! Secondary-index query command.
//!
//! Queries an index for a single key or a key range, optionally returning
//! the matched terms and a pagination continuation. Results can be consumed
//! aggregated or streamed while the query is still running.

use crate::command::{Namespace, ResponseSource, StreamableCommand, DEFAULT_TIMEOUT};
use crate::core::adapter::CoreQueryResult;
use crate::core::iter::ChunkedIterator;
use crate::core::operation::{Operation, OperationFlags};
use crate::error::{ClientError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

/// One decoded index match: the indexed term and the matching object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub term: Bytes,
    pub object_key: Bytes,
}

/// Public description of an executed index query, reported as query info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQueryInfo {
    pub namespace: Namespace,
    pub index: String,
    pub start: Bytes,
    pub end: Option<Bytes>,
}

/// A secondary-index query over raw byte keys.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    namespace: Namespace,
    index: String,
    start: Bytes,
    /// `None` for an exact-match query.
    end: Option<Bytes>,
    return_terms: bool,
    pagination_sort: bool,
    max_results: Option<u32>,
    continuation: Option<Bytes>,
    timeout: Duration,
}

impl IndexQuery {
    /// Query for a single index key.
    pub fn matching(
        namespace: Namespace,
        index: impl Into<String>,
        key: impl Into<Bytes>,
    ) -> IndexQueryBuilder {
        IndexQueryBuilder {
            query: IndexQuery {
                namespace,
                index: index.into(),
                start: key.into(),
                end: None,
                return_terms: false,
                pagination_sort: false,
                max_results: None,
                continuation: None,
                timeout: DEFAULT_TIMEOUT,
            },
        }
    }

    /// Query for an inclusive index key range.
    pub fn range(
        namespace: Namespace,
        index: impl Into<String>,
        start: impl Into<Bytes>,
        end: impl Into<Bytes>,
    ) -> IndexQueryBuilder {
        let mut builder = Self::matching(namespace, index, start);
        builder.query.end = Some(end.into());
        builder
    }

    fn encode_request(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_str(&mut buf, &self.namespace.bucket_type);
        put_str(&mut buf, &self.namespace.bucket);
        put_str(&mut buf, &self.index);
        put_bytes(&mut buf, &self.start);
        match &self.end {
            Some(end) => {
                buf.put_u8(1);
                put_bytes(&mut buf, end);
            }
            None => buf.put_u8(0),
        }
        buf.put_u32(self.max_results.unwrap_or(0));
        match &self.continuation {
            Some(token) => put_bytes(&mut buf, token),
            None => buf.put_u32(0),
        }
        buf.freeze()
    }

    /// Decode a request payload produced by [`build_operation`]. Used by
    /// transport implementations and tests; the layout mirrors
    /// `encode_request` field for field.
    pub fn decode_request(mut payload: Bytes) -> Result<DecodedIndexRequest> {
        let bucket_type = get_str(&mut payload)?;
        let bucket = get_str(&mut payload)?;
        let index = get_str(&mut payload)?;
        let start = get_bytes(&mut payload)?;
        let end = match get_u8(&mut payload)? {
            0 => None,
            _ => Some(get_bytes(&mut payload)?),
        };
        if payload.remaining() < 4 {
            return Err(truncated());
        }
        let max_results = match payload.get_u32() {
            0 => None,
            n => Some(n),
        };
        let continuation = {
            let token = get_bytes(&mut payload)?;
            if token.is_empty() {
                None
            } else {
                Some(token)
            }
        };
        Ok(DecodedIndexRequest {
            namespace: Namespace::new(bucket_type, bucket),
            index,
            start,
            end,
            max_results,
            continuation,
        })
    }
}

/// Decoded form of an index-query request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIndexRequest {
    pub namespace: Namespace,
    pub index: String,
    pub start: Bytes,
    pub end: Option<Bytes>,
    pub max_results: Option<u32>,
    pub continuation: Option<Bytes>,
}

/// Builder for [`IndexQuery`].
pub struct IndexQueryBuilder {
    query: IndexQuery,
}

impl IndexQueryBuilder {
    /// Return the matched index terms alongside object keys.
    pub fn return_terms(mut self, enabled: bool) -> Self {
        self.query.return_terms = enabled;
        self
    }

    /// Ask the server to sort results for stable pagination.
    pub fn pagination_sort(mut self, enabled: bool) -> Self {
        self.query.pagination_sort = enabled;
        self
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.query.max_results = Some(max);
        self
    }

    /// Resume a paginated query from a previously returned token.
    pub fn continuation(mut self, token: Bytes) -> Self {
        self.query.continuation = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout = timeout;
        self
    }

    pub fn build(self) -> IndexQuery {
        self.query
    }
}

/// Response to an [`IndexQuery`], aggregated or streaming.
#[derive(Debug)]
pub struct IndexResponse {
    source: ResponseSource<IndexEntry>,
}

impl IndexResponse {
    pub fn is_streaming(&self) -> bool {
        self.source.is_streaming()
    }

    /// Aggregated entries (batch mode only).
    pub fn entries(&self) -> Result<&[IndexEntry]> {
        self.source.elements()
    }

    /// Continuation token of an aggregated response, if the query was
    /// paginated. In streaming mode read it from the iterator once
    /// exhausted.
    pub fn continuation(&self) -> Option<&Bytes> {
        self.source.continuation()
    }

    /// Take the live entry stream (streaming mode only, single pass).
    pub fn stream(&self) -> Result<ChunkedIterator<IndexEntry>> {
        self.source.stream()
    }
}

impl StreamableCommand for IndexQuery {
    type Elem = IndexEntry;
    type Response = IndexResponse;
    type Info = IndexQueryInfo;
    type CoreInfo = IndexQueryInfo;

    fn build_operation(&self, streaming: bool) -> Operation {
        let mut flags = OperationFlags::empty();
        if streaming {
            flags |= OperationFlags::STREAM;
        }
        if self.return_terms {
            flags |= OperationFlags::RETURN_TERMS;
        }
        if self.pagination_sort {
            flags |= OperationFlags::PAGINATION_SORT;
        }
        Operation::new("index-query", flags, self.encode_request())
    }

    fn core_info(&self) -> IndexQueryInfo {
        IndexQueryInfo {
            namespace: self.namespace.clone(),
            index: self.index.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn create_response(
        &self,
        _timeout: Duration,
        stream: ChunkedIterator<IndexEntry>,
    ) -> IndexResponse {
        IndexResponse {
            source: ResponseSource::streaming(stream),
        }
    }

    fn convert_response(
        &self,
        _operation: &Operation,
        core: CoreQueryResult<IndexEntry>,
    ) -> Result<IndexResponse> {
        Ok(IndexResponse {
            source: ResponseSource::aggregated(core.elements, core.continuation),
        })
    }

    // Raw index queries report the query itself as info.
    fn convert_info(core: IndexQueryInfo) -> IndexQueryInfo {
        core
    }
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn put_bytes(buf: &mut BytesMut, b: &Bytes) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

fn get_u8(payload: &mut Bytes) -> Result<u8> {
    if payload.remaining() < 1 {
        return Err(truncated());
    }
    Ok(payload.get_u8())
}

fn get_str(payload: &mut Bytes) -> Result<String> {
    if payload.remaining() < 2 {
        return Err(truncated());
    }
    let len = payload.get_u16() as usize;
    if payload.remaining() < len {
        return Err(truncated());
    }
    String::from_utf8(payload.split_to(len).to_vec())
        .map_err(|_| ClientError::Protocol("invalid utf-8 in request field".into()))
}

fn get_bytes(payload: &mut Bytes) -> Result<Bytes> {
    if payload.remaining() < 4 {
        return Err(truncated());
    }
    let len = payload.get_u32() as usize;
    if payload.remaining() < len {
        return Err(truncated());
    }
    Ok(payload.split_to(len))
}

fn truncated() -> ClientError {
    ClientError::Protocol("truncated index-query request".into())
}
