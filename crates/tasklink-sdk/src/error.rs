// ABOUTME: Error types for tasklink-sdk.
// ABOUTME: Defines SdkError covering config, task decoding, envelope encoding, and transport failures.

use tasklink_grpc::TransportError;
use thiserror::Error;

/// Errors surfaced by the SDK.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A task payload could not be decoded into a context.
    #[error("task decode failed: {0}")]
    Decode(String),

    /// An envelope could not be serialized.
    #[error("envelope encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The coordinator call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// IO error for config file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;
