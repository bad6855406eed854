//! End-to-end tests: batch and streaming execution against a scripted
//! cluster that drives the dispatch seam from its own producer thread.

use bytes::Bytes;
use silt::command::index::{IndexEntry, IndexQuery};
use silt::command::props::{CoreBucketProps, FetchBucketProps};
use silt::command::Namespace;
use silt::core::{Chunk, Dispatch, Operation, StreamingFuture, Terminal};
use silt::{Client, ClientError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone)]
enum Outcome {
    Success,
    Fail(String),
    /// Never signal a terminal; the producer just stops.
    Hang,
}

/// Dispatch stub that replays a fixed chunk script from a spawned thread.
struct ScriptedCluster<E> {
    script: Vec<Vec<E>>,
    continuation: Option<Bytes>,
    outcome: Outcome,
    chunk_delay: Duration,
    cancels: Arc<AtomicUsize>,
}

impl<E: Clone + Send + 'static> ScriptedCluster<E> {
    fn new(script: Vec<Vec<E>>) -> Self {
        Self {
            script,
            continuation: None,
            outcome: Outcome::Success,
            chunk_delay: Duration::ZERO,
            cancels: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn continuation(mut self, token: &'static [u8]) -> Self {
        self.continuation = Some(Bytes::from_static(token));
        self
    }

    fn failing(mut self, message: &str) -> Self {
        self.outcome = Outcome::Fail(message.to_string());
        self
    }

    fn hanging(mut self) -> Self {
        self.outcome = Outcome::Hang;
        self
    }

    fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    fn cancel_count(&self) -> Arc<AtomicUsize> {
        self.cancels.clone()
    }
}

impl<E: Clone + Send + Sync + 'static> Dispatch<E> for ScriptedCluster<E> {
    fn execute(&self, _operation: &Operation, future: Arc<StreamingFuture<E>>) {
        let script = self.script.clone();
        let continuation = self.continuation.clone();
        let outcome = self.outcome.clone();
        let delay = self.chunk_delay;

        thread::spawn(move || {
            let chunk_count = script.len();
            for (i, elements) in script.into_iter().enumerate() {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                let is_last = i + 1 == chunk_count;
                let chunk = if is_last {
                    Chunk::finishing(elements, continuation.clone())
                } else {
                    Chunk::new(elements)
                };
                if !future.on_chunk(chunk) {
                    // Cancelled under us; stop producing.
                    return;
                }
            }
            match outcome {
                Outcome::Success => {
                    future.on_complete(continuation);
                }
                Outcome::Fail(message) => {
                    future.on_failure(ClientError::Protocol(message));
                }
                Outcome::Hang => {}
            }
        });
    }

    fn cancel(&self, _operation: &Operation) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

fn entry(n: u32) -> IndexEntry {
    IndexEntry {
        term: Bytes::from(n.to_string()),
        object_key: Bytes::from(format!("key-{n}")),
    }
}

fn sample_query() -> IndexQuery {
    IndexQuery::range(
        Namespace::new("users", "by_email"),
        "email_bin",
        Bytes::from_static(b"a"),
        Bytes::from_static(b"m"),
    )
    .build()
}

fn entries_script() -> Vec<Vec<IndexEntry>> {
    // The 2/3/1 scenario: six elements over three chunks.
    vec![
        vec![entry(1), entry(2)],
        vec![entry(3), entry(4), entry(5)],
        vec![entry(6)],
    ]
}

#[test]
fn streaming_yields_elements_while_in_flight() {
    let client = Client::new(
        ScriptedCluster::new(entries_script()).chunk_delay(Duration::from_millis(20)),
    );
    let future = client.execute_streaming(&sample_query());

    // The response is available before the operation completes.
    let response = future.response().unwrap();
    assert!(response.is_streaming());

    let keys: Vec<String> = response
        .stream()
        .unwrap()
        .map(|e| String::from_utf8(e.unwrap().object_key.to_vec()).unwrap())
        .collect();
    assert_eq!(
        keys,
        vec!["key-1", "key-2", "key-3", "key-4", "key-5", "key-6"]
    );

    assert!(future.wait().is_success());
    let info = future.query_info().unwrap();
    assert_eq!(info.index, "email_bin");
    assert_eq!(info.namespace, Namespace::new("users", "by_email"));
}

#[test]
fn batch_and_streaming_agree() {
    let query = sample_query();

    let batch_client = Client::new(ScriptedCluster::new(entries_script()).continuation(b"page-2"));
    let batch = batch_client.execute(&query).response().unwrap();
    assert!(!batch.is_streaming());
    let batch_entries: Vec<IndexEntry> = batch.entries().unwrap().to_vec();
    assert_eq!(batch.continuation(), Some(&Bytes::from_static(b"page-2")));

    let stream_client = Client::new(ScriptedCluster::new(entries_script()).continuation(b"page-2"));
    let streaming = stream_client.execute_streaming(&query).response().unwrap();
    let mut iter = streaming.stream().unwrap();
    let mut stream_entries = Vec::new();
    while let Some(e) = iter.try_next().unwrap() {
        stream_entries.push(e);
    }

    assert_eq!(batch_entries, stream_entries);
    assert_eq!(iter.continuation(), Some(&Bytes::from_static(b"page-2")));
}

#[test]
fn failure_reaches_both_consumption_modes() {
    let query = sample_query();
    let script = vec![vec![entry(1), entry(2)]];

    // Streaming: the buffered chunk drains, then the cause surfaces.
    let client = Client::new(ScriptedCluster::new(script.clone()).failing("index scan aborted"));
    let response = client.execute_streaming(&query).response().unwrap();
    let mut iter = response.stream().unwrap();
    assert_eq!(iter.try_next().unwrap(), Some(entry(1)));
    assert_eq!(iter.try_next().unwrap(), Some(entry(2)));
    assert_eq!(
        iter.try_next().unwrap_err(),
        ClientError::Protocol("index scan aborted".into())
    );

    // Batch: the future itself fails with the same cause.
    let client = Client::new(ScriptedCluster::new(script).failing("index scan aborted"));
    assert_eq!(
        client.execute(&query).response().unwrap_err(),
        ClientError::Protocol("index scan aborted".into())
    );
}

#[test]
fn cancel_unblocks_a_parked_consumer() {
    let cluster = ScriptedCluster::new(vec![vec![entry(1)], vec![entry(2)]])
        .chunk_delay(Duration::from_millis(40))
        .hanging();
    let cancels = cluster.cancel_count();
    let client = Client::new(cluster);

    let future = client.execute_streaming(&sample_query());
    let response = future.response().unwrap();
    let mut iter = response.stream().unwrap();

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        loop {
            match iter.try_next() {
                Ok(Some(e)) => seen.push(e),
                Ok(None) => return (seen, None),
                Err(err) => return (seen, Some(err)),
            }
        }
    });

    thread::sleep(Duration::from_millis(120));
    assert!(future.cancel());
    let (seen, err) = consumer.join().unwrap();

    assert_eq!(err, Some(ClientError::Cancelled));
    assert!(seen.len() <= 2);
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    assert!(matches!(future.wait(), Terminal::Cancelled));
    // Cancelling again is a no-op once terminal.
    assert!(!future.cancel());
}

#[test]
fn batch_timeout_cancels_best_effort() {
    let cluster = ScriptedCluster::new(vec![vec![entry(1)]]).hanging();
    let cancels = cluster.cancel_count();
    let client = Client::new(cluster);

    let future = client.execute(&sample_query());
    let timeout = Duration::from_millis(80);
    assert_eq!(
        future.response_timeout(timeout).unwrap_err(),
        ClientError::Timeout(timeout)
    );
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
    assert!(matches!(future.wait(), Terminal::Cancelled));
}

#[test]
fn batch_response_rejects_iteration() {
    let client = Client::new(ScriptedCluster::new(entries_script()));
    let response = client.execute(&sample_query()).response().unwrap();
    assert!(matches!(
        response.stream().unwrap_err(),
        ClientError::UnsupportedOperation(_)
    ));
}

#[test]
fn streaming_response_is_single_pass() {
    let client = Client::new(ScriptedCluster::new(entries_script()));
    let response = client.execute_streaming(&sample_query()).response().unwrap();
    assert!(matches!(
        response.entries().unwrap_err(),
        ClientError::UnsupportedOperation(_)
    ));

    let iter = response.stream().unwrap();
    drop(iter);
    assert!(matches!(
        response.stream().unwrap_err(),
        ClientError::UnsupportedOperation(_)
    ));
}

#[test]
fn dispatch_sees_the_encoded_request() {
    /// Cluster that decodes the payload and echoes fields back as entries.
    struct EchoCluster;

    impl Dispatch<IndexEntry> for EchoCluster {
        fn execute(&self, operation: &Operation, future: Arc<StreamingFuture<IndexEntry>>) {
            assert!(!operation.is_streaming());
            let decoded = IndexQuery::decode_request(operation.request.clone()).unwrap();
            future.on_chunk(Chunk::new(vec![IndexEntry {
                term: Bytes::from(decoded.index),
                object_key: decoded.start,
            }]));
            future.on_complete(None);
        }
    }

    let client = Client::new(EchoCluster);
    let response = client.execute(&sample_query()).response().unwrap();
    let entries = response.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].term, Bytes::from_static(b"email_bin"));
    assert_eq!(entries[0].object_key, Bytes::from_static(b"a"));
}

#[test]
fn props_fetch_applies_defaults() {
    let cluster = ScriptedCluster::new(vec![vec![CoreBucketProps {
        n_val: Some(4),
        allow_mult: Some(true),
        last_write_wins: None,
        backend: None,
    }]]);
    let client = Client::new(cluster);

    let future = client.execute(&FetchBucketProps::new(Namespace::bucket("accounts")));
    let props = future.response().unwrap().props().unwrap();
    assert_eq!(props.n_val, 4);
    assert!(props.allow_mult);
    assert!(!props.last_write_wins);
    assert_eq!(props.backend, "default");
    assert_eq!(future.query_info(), Some(Namespace::bucket("accounts")));
}
