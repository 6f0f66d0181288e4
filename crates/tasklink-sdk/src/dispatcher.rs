// ABOUTME: Result dispatcher that submits event envelopes over the unary SendResult call.
// ABOUTME: One attempt per envelope; retry policy belongs to the caller.

use std::sync::Arc;

use tasklink_grpc::TaskTransport;
use tasklink_proto::ResultMessage;

use crate::envelope::Envelope;
use crate::error::SdkError;

/// Sends envelopes through a shared transport.
#[derive(Clone)]
pub struct ResultDispatcher {
    transport: Arc<dyn TaskTransport>,
}

impl ResultDispatcher {
    pub fn new(transport: Arc<dyn TaskTransport>) -> Self {
        Self { transport }
    }

    /// Serialize `envelope`, stamp it with the send time, and submit it once.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SdkError> {
        let message = ResultMessage {
            data: envelope.to_bytes()?,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.transport.send_result(message).await?;
        tracing::debug!(
            query_id = %envelope.query_id,
            event_type = ?envelope.event_type,
            "result sent"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ResultDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentIdentity, Context, Identity};
    use crate::envelope::EventKind;
    use async_trait::async_trait;
    use serde_json::json;
    use tasklink_grpc::{TaskStream, TransportError};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<ResultMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskTransport for RecordingTransport {
        async fn wait_for_ready(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn open_task_stream(&self, _identity: &str) -> Result<TaskStream, TransportError> {
            Err(TransportError::StreamError("not used".into()))
        }

        async fn send_result(&self, message: ResultMessage) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::ConnectionFailed("coordinator down".into()));
            }
            self.sent.lock().await.push(message);
            Ok(())
        }

        async fn close(&self) {}
    }

    fn envelope() -> Envelope {
        let context = Context {
            query_id: "q1".into(),
            params: json!({"k": "v"}),
            webhook_groups: vec![],
            identity: Identity::Agent(AgentIdentity {
                agent_id: "a1".into(),
                agent_name: "A".into(),
            }),
        };
        Envelope::build(&context, EventKind::QueryCompleted, json!({"data": "done"}))
    }

    #[tokio::test]
    async fn test_send_serializes_envelope_with_timestamp() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = ResultDispatcher::new(transport.clone());

        let before = chrono::Utc::now().timestamp_millis();
        dispatcher.send(&envelope()).await.unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].timestamp >= before && sent[0].timestamp <= after);

        let decoded: Envelope = serde_json::from_slice(&sent[0].data).unwrap();
        assert_eq!(decoded, envelope());
    }

    #[tokio::test]
    async fn test_send_failure_is_surfaced_once() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let dispatcher = ResultDispatcher::new(transport.clone());

        let err = dispatcher.send(&envelope()).await.unwrap_err();
        assert!(matches!(err, SdkError::Transport(TransportError::ConnectionFailed(_))));
        assert!(transport.sent.lock().await.is_empty());
    }
}
