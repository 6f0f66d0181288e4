// ABOUTME: Shared test doubles for tasklink-sdk integration tests.
// ABOUTME: In-memory TaskTransport with scripted probe failures and test-controlled task streams.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tasklink_sdk::tasklink_grpc::tasklink_proto::{ResultMessage, TaskMessage};
use tasklink_sdk::tasklink_grpc::{BackoffConfig, TaskStream, TaskTransport, TransportError};
use tasklink_sdk::ConnectionConfig;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type StreamSender = mpsc::UnboundedSender<Result<TaskMessage, TransportError>>;

/// Transport double. Every `open_task_stream` call creates a new stream the
/// test can push tasks into, fail, or end by index.
#[derive(Default)]
pub struct MockTransport {
    failing_probes: AtomicUsize,
    hanging_probes: AtomicUsize,
    probes: AtomicUsize,
    opens: AtomicUsize,
    streams: Mutex<Vec<Option<StreamSender>>>,
    send_attempts: AtomicUsize,
    results: Mutex<Vec<ResultMessage>>,
    fail_sends: AtomicBool,
    closes: AtomicUsize,
    reopens: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `count` readiness probes fail immediately.
    pub fn fail_probes(&self, count: usize) {
        self.failing_probes.store(count, Ordering::SeqCst);
    }

    /// The next `count` readiness probes never complete.
    pub fn hang_probes(&self, count: usize) {
        self.hanging_probes.store(count, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reopens(&self) -> usize {
        self.reopens.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push a JSON task onto stream `index`. Returns false if the manager
    /// already dropped that stream.
    pub fn push_task(&self, index: usize, payload: &Value) -> bool {
        let bytes = serde_json::to_vec(payload).unwrap();
        self.push_raw(index, bytes)
    }

    pub fn push_raw(&self, index: usize, payload: Vec<u8>) -> bool {
        self.send_on(index, Ok(TaskMessage { payload }))
    }

    /// Make stream `index` yield an error.
    pub fn break_stream(&self, index: usize) -> bool {
        self.send_on(
            index,
            Err(TransportError::StreamError("connection reset".into())),
        )
    }

    /// End stream `index` cleanly, as a coordinator closing it would.
    pub fn end_stream(&self, index: usize) {
        if let Some(slot) = self.streams.lock().unwrap().get_mut(index) {
            slot.take();
        }
    }

    /// Whether the manager has dropped its end of stream `index`.
    pub fn stream_dropped(&self, index: usize) -> bool {
        match self.streams.lock().unwrap().get(index) {
            Some(Some(sender)) => sender.is_closed(),
            _ => true,
        }
    }

    /// Successfully sent results, decoded as JSON.
    pub fn results(&self) -> Vec<Value> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .map(|message| serde_json::from_slice(&message.data).unwrap())
            .collect()
    }

    pub fn result_timestamps(&self) -> Vec<i64> {
        self.results
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.timestamp)
            .collect()
    }

    fn send_on(&self, index: usize, item: Result<TaskMessage, TransportError>) -> bool {
        match self.streams.lock().unwrap().get(index) {
            Some(Some(sender)) => sender.send(item).is_ok(),
            _ => false,
        }
    }
}

#[async_trait]
impl TaskTransport for MockTransport {
    async fn wait_for_ready(&self) -> Result<(), TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if take_one(&self.hanging_probes) {
            std::future::pending::<()>().await;
        }
        if take_one(&self.failing_probes) {
            return Err(TransportError::ConnectionFailed("connection refused".into()));
        }
        Ok(())
    }

    async fn open_task_stream(&self, _identity: &str) -> Result<TaskStream, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push(Some(tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn send_result(&self, message: ResultMessage) -> Result<(), TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("coordinator unavailable".into()));
        }
        self.results.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.reopens.fetch_add(1, Ordering::SeqCst);
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Connection settings with millisecond-scale backoff so tests run fast.
pub fn fast_config(identity: &str) -> ConnectionConfig {
    ConnectionConfig::new(identity)
        .with_probe_timeout(Duration::from_millis(50))
        .with_backoff(BackoffConfig {
            floor: Duration::from_millis(10),
            ceiling: Duration::from_millis(40),
            max_jitter: Duration::ZERO,
        })
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Give spawned tasks a moment to misbehave before asserting that they did not.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
