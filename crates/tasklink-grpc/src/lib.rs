// ABOUTME: Shared gRPC client utilities for tasklink workers.
// ABOUTME: Provides channel creation, reconnect backoff, the task stream receiver, and the transport seam.

pub mod backoff;
pub mod channel;
pub mod error;
pub mod stream;
pub mod transport;

// Channel creation
pub use channel::{create_channel, ChannelConfig, KeepAliveConfig};

// Error types
pub use error::TransportError;

// Reconnect policy
pub use backoff::{Backoff, BackoffConfig};

// Stream management
pub use stream::{TaskStream, TaskStreamReceiver};

// Transport seam
pub use transport::{GrpcTransport, TaskTransport};

// Re-export proto types for convenience
pub use tasklink_proto;
