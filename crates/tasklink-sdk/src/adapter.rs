// ABOUTME: Task dispatch adapter: decodes each task, runs the handler, reports handler failures.
// ABOUTME: Every task runs on its own tokio task; a failure produces one QUERY_FAILED attempt.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use tasklink_proto::TaskMessage;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::context::{recover_query_id, Context, TaskKind};
use crate::envelope::{Envelope, EventKind};
use crate::handler::{Emitters, TaskHandler};
use crate::manager::{ConnectionManager, TaskHook};

/// Connects a [`TaskHandler`] to a connection manager's task stream.
pub struct TaskDispatcher<H> {
    handler: Arc<H>,
    kind: TaskKind,
}

impl<H: TaskHandler> TaskDispatcher<H> {
    pub fn new(kind: TaskKind, handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            kind,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl<H: TaskHandler> TaskHook for TaskDispatcher<H> {
    fn on_task(&self, manager: &ConnectionManager, task: TaskMessage) {
        let manager = manager.clone();
        let handler = self.handler.clone();
        let kind = self.kind;
        tokio::spawn(dispatch_task(manager, handler, kind, task.payload));
    }
}

/// Decode one task payload and run `handler` on it.
///
/// Handler errors and panics are turned into a single `QUERY_FAILED`
/// envelope. If sending that envelope fails too, the failure is logged and
/// dropped.
pub async fn dispatch_task<H: TaskHandler>(
    manager: ConnectionManager,
    handler: Arc<H>,
    kind: TaskKind,
    payload: Vec<u8>,
) {
    let context = match Context::decode(&payload) {
        Ok(context) => Arc::new(context),
        Err(e) => {
            report_undecodable(&manager, &payload, &e.to_string()).await;
            return;
        }
    };

    let span = info_span!("task", query_id = %context.query_id, kind = %context.kind());
    async move {
        if context.kind() != kind {
            let message = format!("expected {} task, received {} task", kind, context.kind());
            warn!(%message, "rejecting task");
            report_failure(&manager, &context, message).await;
            return;
        }

        debug!("dispatching task to handler");
        let emitters = Emitters::new(context.clone(), manager.clone());
        let outcome = AssertUnwindSafe(handler.handle(context.clone(), emitters))
            .catch_unwind()
            .await;

        let message = match outcome {
            Ok(Ok(())) => {
                debug!("handler finished");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        warn!(error = %message, "handler failed");
        report_failure(&manager, &context, message).await;
    }
    .instrument(span)
    .await
}

async fn report_failure(manager: &ConnectionManager, context: &Context, message: String) {
    if let Err(e) = manager
        .emit(context, EventKind::QueryFailed, json!({ "data": message }))
        .await
    {
        error!(error = %e, "could not report task failure");
    }
}

async fn report_undecodable(manager: &ConnectionManager, payload: &[u8], message: &str) {
    let Some(query_id) = recover_query_id(payload) else {
        error!(error = %message, bytes = payload.len(), "dropping undecodable task");
        return;
    };

    warn!(%query_id, error = %message, "task payload did not decode");
    let envelope = Envelope::undecodable_task(query_id, message);
    if let Err(e) = manager.send_envelope(&envelope).await {
        error!(query_id = %envelope.query_id, error = %e, "could not report undecodable task");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
