// ABOUTME: Connection manager owning the single task stream, its reconnect backoff, and result sending.
// ABOUTME: Explicit state enum with a pure transition function; a supervisor task drives it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tasklink_grpc::{Backoff, BackoffConfig, TaskStream, TaskTransport, TransportError};
use tasklink_proto::TaskMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::context::Context;
use crate::dispatcher::ResultDispatcher;
use crate::envelope::{Envelope, EventKind};
use crate::error::SdkError;

/// Default bound on the readiness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Settings for one connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Process-scoped identity sent with every `TaskStream` request.
    pub identity: String,
    /// Bound on the readiness probe before each stream attempt.
    pub probe_timeout: Duration,
    /// Reconnect delay policy.
    pub backoff: BackoffConfig,
}

impl ConnectionConfig {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Where the manager is in its connect/stream/retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or cleaned up.
    Idle,
    /// Readiness probe or stream open in flight.
    Connecting,
    /// Task stream open.
    Streaming,
    /// Waiting before the next attempt.
    Backoff,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    StreamOpened,
    /// Probe failed, probe timed out, or the stream could not be opened.
    ConnectFailed,
    /// An open stream errored or ended.
    StreamLost,
    RetryElapsed,
    Shutdown,
}

impl ConnectionState {
    /// Transition function. `None` means the event is not valid in this state.
    pub fn next(self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (_, E::Shutdown) => Some(S::Idle),
            (S::Idle, E::Start) => Some(S::Connecting),
            // Re-entrant start never opens a second stream
            (_, E::Start) => Some(self),
            (S::Connecting, E::StreamOpened) => Some(S::Streaming),
            (S::Connecting, E::ConnectFailed) => Some(S::Backoff),
            (S::Streaming, E::StreamLost) => Some(S::Backoff),
            (S::Backoff, E::RetryElapsed) => Some(S::Connecting),
            _ => None,
        }
    }
}

/// Receives each task as the stream yields it.
///
/// Called on the supervisor task, in stream order. Implementations must not
/// block; spawn the real work.
pub trait TaskHook: Send + Sync + 'static {
    fn on_task(&self, manager: &ConnectionManager, task: TaskMessage);
}

struct Slot {
    state: ConnectionState,
    /// Incremented on every start; a supervisor from an older run may not touch the slot.
    run: u64,
    active_stream: Option<u64>,
    shutdown: CancellationToken,
}

struct Inner {
    config: ConnectionConfig,
    transport: Arc<dyn TaskTransport>,
    dispatcher: ResultDispatcher,
    hook: Arc<dyn TaskHook>,
    slot: Mutex<Slot>,
    next_stream_id: AtomicU64,
}

enum Disconnect {
    Ended,
    Failed(TransportError),
    Shutdown,
}

/// Owns at most one task stream and keeps it alive until [`cleanup`](Self::cleanup).
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn TaskTransport>,
        hook: Arc<dyn TaskHook>,
    ) -> Self {
        let dispatcher = ResultDispatcher::new(transport.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                dispatcher,
                hook,
                slot: Mutex::new(Slot {
                    state: ConnectionState::Idle,
                    run: 0,
                    active_stream: None,
                    shutdown: CancellationToken::new(),
                }),
                next_stream_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.config.identity
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.slot().state
    }

    /// Id of the open task stream, if any. Every stream gets a new id.
    pub fn active_stream(&self) -> Option<u64> {
        self.slot().active_stream
    }

    /// Begin connecting in the background. Does nothing unless `Idle`.
    ///
    /// Must be called from within a tokio runtime. Connection failures never
    /// surface here; they are logged and retried with backoff.
    pub fn start(&self) {
        let (run, shutdown) = {
            let mut slot = self.slot();
            if slot.state != ConnectionState::Idle {
                debug!(state = ?slot.state, "start ignored, already running");
                return;
            }
            slot.state = ConnectionState::Connecting;
            slot.run += 1;
            slot.shutdown = CancellationToken::new();
            (slot.run, slot.shutdown.clone())
        };
        self.inner.transport.reopen();

        let span = info_span!("task_stream", identity = %self.inner.config.identity);
        tokio::spawn(self.clone().supervise(run, shutdown).instrument(span));
    }

    /// Build the envelope for `kind` and send it once.
    pub async fn emit(
        &self,
        context: &Context,
        kind: EventKind,
        payload: Value,
    ) -> Result<Envelope, SdkError> {
        let envelope = Envelope::build(context, kind, payload);
        self.inner.dispatcher.send(&envelope).await?;
        Ok(envelope)
    }

    /// Send an already built envelope once.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), SdkError> {
        self.inner.dispatcher.send(envelope).await
    }

    /// Stop the supervisor, drop any open stream, and release the transport.
    /// Sends from handlers still running fail until the next `start`.
    /// Safe to call repeatedly. A later `start` begins a fresh run.
    pub async fn cleanup(&self) {
        let previous = {
            let mut slot = self.slot();
            slot.shutdown.cancel();
            slot.active_stream = None;
            slot.state
        };
        // Stay out of Idle until the transport is closed so a racing start
        // cannot reopen it first
        self.inner.transport.close().await;
        self.slot().state = ConnectionState::Idle;
        info!(identity = %self.inner.config.identity, ?previous, "connection manager cleaned up");
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // No code path panics while holding the lock; recover anyway
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `event` if `run` is still the current run. Returns false when
    /// this supervisor has been superseded or shut down.
    fn advance(&self, run: u64, event: ConnectionEvent) -> bool {
        let mut slot = self.slot();
        Self::advance_locked(&mut slot, run, event)
    }

    fn advance_locked(slot: &mut Slot, run: u64, event: ConnectionEvent) -> bool {
        if slot.run != run || slot.shutdown.is_cancelled() {
            return false;
        }
        match slot.state.next(event) {
            Some(next) => {
                debug!(from = ?slot.state, to = ?next, ?event, "connection state changed");
                slot.state = next;
            }
            None => warn!(state = ?slot.state, ?event, "ignoring invalid connection transition"),
        }
        true
    }

    fn attach_stream(&self, run: u64, stream_id: u64) -> bool {
        let mut slot = self.slot();
        if !Self::advance_locked(&mut slot, run, ConnectionEvent::StreamOpened) {
            return false;
        }
        slot.active_stream = Some(stream_id);
        true
    }

    fn detach_stream(&self, stream_id: u64) {
        let mut slot = self.slot();
        // A newer stream may already be recorded; leave it alone
        if slot.active_stream == Some(stream_id) {
            slot.active_stream = None;
        }
    }

    async fn supervise(self, run: u64, shutdown: CancellationToken) {
        let mut backoff = Backoff::new(self.inner.config.backoff.clone());

        loop {
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                result = self.connect() => result,
            };

            let event = match connected {
                Ok(stream) => {
                    backoff.reset();
                    let stream_id = self.inner.next_stream_id.fetch_add(1, Ordering::SeqCst) + 1;
                    if !self.attach_stream(run, stream_id) {
                        return;
                    }
                    info!(stream_id, "task stream established");

                    let disconnect = self.pump(stream, &shutdown).await;
                    self.detach_stream(stream_id);
                    match disconnect {
                        Disconnect::Shutdown => return,
                        Disconnect::Ended => {
                            warn!(stream_id, "task stream ended by coordinator")
                        }
                        Disconnect::Failed(e) => {
                            warn!(stream_id, error = %e, "task stream failed")
                        }
                    }
                    ConnectionEvent::StreamLost
                }
                Err(e) => {
                    warn!(error = %e, "could not open task stream");
                    ConnectionEvent::ConnectFailed
                }
            };

            if !self.advance(run, event) {
                return;
            }

            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.advance(run, ConnectionEvent::RetryElapsed) {
                return;
            }
        }
    }

    async fn connect(&self) -> Result<TaskStream, TransportError> {
        let probe_timeout = self.inner.config.probe_timeout;
        tokio::time::timeout(probe_timeout, self.inner.transport.wait_for_ready())
            .await
            .map_err(|_| TransportError::ProbeTimeout(probe_timeout))??;
        self.inner
            .transport
            .open_task_stream(&self.inner.config.identity)
            .await
    }

    async fn pump(&self, mut stream: TaskStream, shutdown: &CancellationToken) -> Disconnect {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Disconnect::Shutdown,
                item = stream.next() => match item {
                    Some(Ok(task)) => self.inner.hook.on_task(self, task),
                    Some(Err(e)) => return Disconnect::Failed(e),
                    None => return Disconnect::Ended,
                },
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot();
        f.debug_struct("ConnectionManager")
            .field("identity", &self.inner.config.identity)
            .field("state", &slot.state)
            .field("active_stream", &slot.active_stream)
            .finish()
    }
}
