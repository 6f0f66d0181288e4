// ABOUTME: Handler trait implemented by user task logic, plus the emitters handed to it.
// ABOUTME: Emitters bundle the immutable task context with the four event-reporting calls.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::envelope::{Envelope, EventKind};
use crate::error::SdkError;
use crate::manager::ConnectionManager;

/// User logic invoked once per task.
///
/// Returning an error (or panicking) makes the SDK report a single
/// `QUERY_FAILED` event carrying the error message.
///
/// # Example
///
/// ```ignore
/// struct Summarizer;
///
/// #[async_trait]
/// impl TaskHandler for Summarizer {
///     async fn handle(&self, context: Arc<Context>, emit: Emitters) -> anyhow::Result<()> {
///         emit.query_created(json!({"data": "started"})).await?;
///         let summary = summarize(&context.params).await?;
///         emit.query_completed(json!({"data": summary})).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, context: Arc<Context>, emit: Emitters) -> anyhow::Result<()>;
}

/// A [`TaskHandler`] built from an async closure. See [`handler_fn`].
pub struct HandlerFn<F> {
    callback: F,
}

/// Wrap an async closure as a [`TaskHandler`].
pub fn handler_fn<F, Fut>(callback: F) -> HandlerFn<F>
where
    F: Fn(Arc<Context>, Emitters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    HandlerFn { callback }
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn(Arc<Context>, Emitters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, context: Arc<Context>, emit: Emitters) -> anyhow::Result<()> {
        (self.callback)(context, emit).await
    }
}

/// The event-reporting calls available to a handler, bound to one task.
///
/// Each call builds one envelope and sends it once. Calls are independent:
/// they are ordered only if the handler awaits them in sequence.
#[derive(Clone)]
pub struct Emitters {
    context: Arc<Context>,
    manager: ConnectionManager,
}

impl Emitters {
    pub(crate) fn new(context: Arc<Context>, manager: ConnectionManager) -> Self {
        Self { context, manager }
    }

    /// The task these emitters report for.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `QUERY_CREATED` / `emitQueryCreated`.
    pub async fn query_created(&self, payload: Value) -> Result<Envelope, SdkError> {
        self.emit(EventKind::QueryCreated, payload).await
    }

    /// `QUERY_COMPLETED` / `emitQueryCompleted`.
    pub async fn query_completed(&self, payload: Value) -> Result<Envelope, SdkError> {
        self.emit(EventKind::QueryCompleted, payload).await
    }

    /// `QUERY_FAILED` / `emitQueryFailed`.
    pub async fn query_failed(&self, payload: Value) -> Result<Envelope, SdkError> {
        self.emit(EventKind::QueryFailed, payload).await
    }

    /// `EVENT_CREATED` / `emitEventCreated`.
    pub async fn event_created(&self, payload: Value) -> Result<Envelope, SdkError> {
        self.emit(EventKind::EventCreated, payload).await
    }

    pub async fn emit(&self, kind: EventKind, payload: Value) -> Result<Envelope, SdkError> {
        self.manager.emit(&self.context, kind, payload).await
    }
}

impl std::fmt::Debug for Emitters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitters")
            .field("query_id", &self.context.query_id)
            .finish_non_exhaustive()
    }
}
