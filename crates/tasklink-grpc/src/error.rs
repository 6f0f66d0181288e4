// ABOUTME: Error types for the tasklink-grpc crate.
// ABOUTME: Provides structured errors for channel, probe, stream, and unary call failures.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur talking to the coordinator.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Invalid server address format.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// Failed to connect to the server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Readiness probe did not complete in time.
    #[error("readiness probe timed out after {}ms", .0.as_millis())]
    ProbeTimeout(Duration),

    /// A call was rejected with a gRPC status.
    #[error("rpc failed: {code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },

    /// Error while reading the task stream.
    #[error("stream error: {0}")]
    StreamError(String),

    /// The transport was closed by cleanup.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// gRPC status code, if this error came from a rejected call.
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            TransportError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        TransportError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<tonic::transport::Error> for TransportError {
    fn from(err: tonic::transport::Error) -> Self {
        TransportError::ConnectionFailed(err.to_string())
    }
}
