// ABOUTME: Re-exports generated protobuf types for the tasklink protocol.
// ABOUTME: Single source of truth for the task service and its message types.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Generated protobuf types for the tasklink protocol.
pub mod tasklink {
    tonic::include_proto!("tasklink");
}

// Re-export commonly used types at crate root for convenience
pub use tasklink::*;

// Re-export client types under a client module
pub mod client {
    pub use super::tasklink::task_service_client::TaskServiceClient;
}

// Re-export server types under a server module
pub mod server {
    pub use super::tasklink::task_service_server::{TaskService, TaskServiceServer};
}
