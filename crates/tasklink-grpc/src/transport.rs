// ABOUTME: Transport seam between the connection manager and the coordinator RPCs.
// ABOUTME: GrpcTransport implements it over one lazily connected, shared tonic channel.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tasklink_proto::client::TaskServiceClient;
use tasklink_proto::{ResultMessage, TaskStreamRequest};
use tokio::sync::Mutex;
use tonic::transport::Channel;

use crate::channel::{create_channel, ChannelConfig};
use crate::error::TransportError;
use crate::stream::{TaskStream, TaskStreamReceiver};

/// The calls a task worker makes against its coordinator.
///
/// One implementation instance is shared by the stream supervisor and by
/// every in-flight handler sending results, so methods take `&self`.
#[async_trait]
pub trait TaskTransport: Send + Sync {
    /// Readiness probe. Resolves once the coordinator is reachable.
    /// Callers bound it with their own timeout.
    async fn wait_for_ready(&self) -> Result<(), TransportError>;

    /// Open a fresh task stream for `identity`.
    async fn open_task_stream(&self, identity: &str) -> Result<TaskStream, TransportError>;

    /// Submit one result. Single attempt, no retry.
    async fn send_result(&self, message: ResultMessage) -> Result<(), TransportError>;

    /// Release the underlying client. Safe to call more than once. Calls
    /// made after close fail with [`TransportError::Closed`] until [`reopen`](Self::reopen).
    async fn close(&self);

    /// Allow calls again after [`close`](Self::close).
    fn reopen(&self) {}
}

/// tonic-backed transport. The channel is created on first use and reused
/// across reconnects until [`TaskTransport::close`].
pub struct GrpcTransport {
    config: ChannelConfig,
    client: Mutex<Option<TaskServiceClient<Channel>>>,
    closed: AtomicBool,
}

impl GrpcTransport {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Whether a client is currently held.
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn client(&self) -> Result<TaskServiceClient<Channel>, TransportError> {
        let mut slot = self.client.lock().await;
        // Checked under the lock so a concurrent close cannot be undone
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let channel = create_channel(&self.config).await?;
        let client = TaskServiceClient::new(channel);
        *slot = Some(client.clone());
        tracing::debug!(address = %self.config.address, "task service client created");
        Ok(client)
    }
}

#[async_trait]
impl TaskTransport for GrpcTransport {
    async fn wait_for_ready(&self) -> Result<(), TransportError> {
        self.client().await.map(|_| ())
    }

    async fn open_task_stream(&self, identity: &str) -> Result<TaskStream, TransportError> {
        let mut client = self.client().await?;
        let response = client
            .task_stream(TaskStreamRequest {
                identity: identity.to_string(),
            })
            .await?;
        Ok(TaskStreamReceiver::new(response.into_inner()).boxed())
    }

    async fn send_result(&self, message: ResultMessage) -> Result<(), TransportError> {
        let mut client = self.client().await?;
        client.send_result(message).await?;
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.client.lock().await.take().is_some() {
            tracing::debug!(address = %self.config.address, "task service client released");
        }
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_transport() -> GrpcTransport {
        GrpcTransport::new(
            ChannelConfig::new("http://127.0.0.1:1").with_connect_timeout(Duration::from_millis(100)),
        )
    }

    #[tokio::test]
    async fn test_client_is_lazy() {
        let transport = unreachable_transport();
        assert!(!transport.is_connected().await);
        assert_eq!(transport.config().address, "http://127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_wait_for_ready_fails_when_unreachable() {
        let transport = unreachable_transport();
        let err = transport.wait_for_ready().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_result_fails_when_unreachable() {
        let transport = unreachable_transport();
        let result = transport
            .send_result(ResultMessage {
                data: b"{}".to_vec(),
                timestamp: 0,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = unreachable_transport();
        transport.close().await;
        transport.close().await;
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_calls_until_reopened() {
        let transport = unreachable_transport();
        transport.close().await;

        let err = transport.wait_for_ready().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        let err = transport
            .send_result(ResultMessage {
                data: b"{}".to_vec(),
                timestamp: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(transport.open_task_stream("worker-1").await.is_err());
        assert!(!transport.is_connected().await);

        transport.reopen();
        let err = transport.wait_for_ready().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
