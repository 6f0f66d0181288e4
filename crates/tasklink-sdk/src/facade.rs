// ABOUTME: Entry points that register an agent or chatbot handler and start its connection.
// ABOUTME: The caller owns the returned manager and is responsible for calling cleanup().

use std::sync::Arc;

use tasklink_grpc::{GrpcTransport, TaskTransport};
use tracing::info;

use crate::adapter::TaskDispatcher;
use crate::config::SdkConfig;
use crate::context::TaskKind;
use crate::error::Result;
use crate::handler::TaskHandler;
use crate::manager::{ConnectionConfig, ConnectionManager};

/// Register `handler` for agent tasks and start streaming.
///
/// Must be called from within a tokio runtime.
pub fn init_agent<H: TaskHandler>(config: &SdkConfig, handler: H) -> Result<ConnectionManager> {
    init(TaskKind::Agent, config, handler)
}

/// Register `handler` for chatbot tasks and start streaming.
///
/// Must be called from within a tokio runtime.
pub fn init_chatbot<H: TaskHandler>(config: &SdkConfig, handler: H) -> Result<ConnectionManager> {
    init(TaskKind::Chatbot, config, handler)
}

/// Register `handler` over a caller-supplied transport and start streaming.
pub fn init_with_transport<H: TaskHandler>(
    kind: TaskKind,
    config: ConnectionConfig,
    transport: Arc<dyn TaskTransport>,
    handler: H,
) -> ConnectionManager {
    let dispatcher = Arc::new(TaskDispatcher::new(kind, handler));
    let manager = ConnectionManager::new(config, transport, dispatcher);
    info!(identity = %manager.identity(), %kind, "registering task handler");
    manager.start();
    manager
}

fn init<H: TaskHandler>(kind: TaskKind, config: &SdkConfig, handler: H) -> Result<ConnectionManager> {
    config.validate()?;
    let transport = Arc::new(GrpcTransport::new(config.channel_config()));
    Ok(init_with_transport(
        kind,
        config.connection_config(),
        transport,
        handler,
    ))
}
