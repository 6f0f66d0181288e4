// ABOUTME: gRPC channel creation with keep-alive and TLS configuration.
// ABOUTME: Builds the tonic endpoint used for both the task stream and result submission.

use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::TransportError;

/// Configuration for gRPC channel keep-alive behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Interval between keep-alive pings when the connection is idle.
    pub interval: Duration,
    /// Timeout waiting for keep-alive response before considering connection dead.
    pub timeout: Duration,
    /// Whether to send keep-alive pings even when no streams are active.
    pub while_idle: bool,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20),
            while_idle: true,
        }
    }
}

/// Configuration for the coordinator channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Coordinator address (e.g., "http://localhost:50051").
    pub address: String,
    /// Keep-alive configuration. If None, keep-alive is disabled.
    pub keep_alive: Option<KeepAliveConfig>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Enable TLS for the connection.
    pub use_tls: bool,
}

impl ChannelConfig {
    /// Create a channel config with default settings.
    /// TLS is enabled when the address uses the https:// scheme.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into().trim().to_string();
        let use_tls = address.to_lowercase().starts_with("https://");
        Self {
            address,
            keep_alive: Some(KeepAliveConfig::default()),
            connect_timeout: Some(Duration::from_secs(5)),
            use_tls,
        }
    }

    /// Disable keep-alive.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive = None;
        self
    }

    /// Set custom keep-alive configuration.
    pub fn with_keep_alive(mut self, config: KeepAliveConfig) -> Self {
        self.keep_alive = Some(config);
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the tonic endpoint without connecting.
    pub fn endpoint(&self) -> Result<Endpoint, TransportError> {
        if self.address.is_empty() {
            return Err(TransportError::InvalidAddress("address is empty".into()));
        }

        let mut endpoint = Endpoint::from_shared(self.address.clone())
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?;

        if self.use_tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| TransportError::ConnectionFailed(format!("TLS config error: {}", e)))?;
        }

        // Long-lived task streams sit idle between tasks; keep-alive detects
        // dead peers and stops load balancers from silently dropping them.
        if let Some(ka) = &self.keep_alive {
            endpoint = endpoint
                .http2_keep_alive_interval(ka.interval)
                .keep_alive_timeout(ka.timeout)
                .keep_alive_while_idle(ka.while_idle);
        }

        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        Ok(endpoint)
    }
}

/// Connect a gRPC channel with the specified configuration.
pub async fn create_channel(config: &ChannelConfig) -> Result<Channel, TransportError> {
    let channel = config
        .endpoint()?
        .connect()
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    tracing::debug!(
        address = %config.address,
        keep_alive = config.keep_alive.is_some(),
        use_tls = config.use_tls,
        "gRPC channel connected"
    );

    Ok(channel)
}
