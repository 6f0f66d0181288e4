// ABOUTME: Server-streaming task receiver and the boxed stream type transports hand out.
// ABOUTME: Maps tonic stream errors into TransportError so callers see one error type.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::BoxStream;
use futures::Stream;
use tasklink_proto::TaskMessage;
use tonic::Streaming;

use crate::error::TransportError;

/// Stream of tasks for one connection. Ends when the coordinator closes it;
/// yields an error when the connection breaks.
pub type TaskStream = BoxStream<'static, Result<TaskMessage, TransportError>>;

/// Receiver side of the `TaskStream` RPC.
pub struct TaskStreamReceiver {
    inner: Streaming<TaskMessage>,
}

impl TaskStreamReceiver {
    pub fn new(streaming: Streaming<TaskMessage>) -> Self {
        Self { inner: streaming }
    }
}

impl Stream for TaskStreamReceiver {
    type Item = Result<TaskMessage, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|opt| opt.map(|res| res.map_err(|e| TransportError::StreamError(e.to_string()))))
    }
}
