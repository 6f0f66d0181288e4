// ABOUTME: tasklink SDK: register a handler that receives tasks over a persistent gRPC stream.
// ABOUTME: Wires the connection manager, task dispatch, event envelopes, and result submission.

pub mod adapter;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod facade;
pub mod handler;
pub mod manager;

pub use adapter::TaskDispatcher;
pub use config::SdkConfig;
pub use context::{AgentIdentity, ChatbotIdentity, Context, Identity, TaskKind};
pub use dispatcher::ResultDispatcher;
pub use envelope::{Envelope, EventKind, EventType, WebhookListener};
pub use error::{Result, SdkError};
pub use facade::{init_agent, init_chatbot, init_with_transport};
pub use handler::{handler_fn, Emitters, HandlerFn, TaskHandler};
pub use manager::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, TaskHook,
    DEFAULT_PROBE_TIMEOUT,
};

// Re-export the transport layer for callers supplying their own transport
pub use tasklink_grpc;
