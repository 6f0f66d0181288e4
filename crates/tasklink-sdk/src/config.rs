// ABOUTME: Configuration loading and validation for tasklink workers.
// ABOUTME: TOML file with environment variable expansion and defaults for every connection knob.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tasklink_grpc::{BackoffConfig, ChannelConfig, KeepAliveConfig};
use tracing::warn;

use crate::error::{Result, SdkError};
use crate::manager::ConnectionConfig;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Process-scoped identity. Usually supplied on the command line rather than in the file.
    pub identity: String,
    pub gateway: GatewayConfig,
    pub connection: ConnectionSettings,
}

/// Coordinator endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// gRPC URL of the coordinator (e.g., "http://localhost:50051"). https:// enables TLS.
    pub url: String,
    pub connect_timeout_ms: u64,
    pub keep_alive_interval_secs: u64,
    pub keep_alive_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:50051".to_string(),
            connect_timeout_ms: 5000,
            keep_alive_interval_secs: 10,
            keep_alive_timeout_secs: 20,
        }
    }
}

/// Readiness probe and reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub probe_timeout_ms: u64,
    pub backoff_floor_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub backoff_jitter_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2000,
            backoff_floor_ms: 1000,
            backoff_ceiling_ms: 10_000,
            backoff_jitter_ms: 300,
        }
    }
}

impl SdkConfig {
    /// Default config location: `~/.config/tasklink/agent.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tasklink").join("agent.toml"))
    }

    /// Load from `path`, or from the default location if `path` is None.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SdkError::Config(format!("failed to read config from {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse TOML, expanding `${VAR}` references first. Undefined variables
    /// expand to the empty string with a warning.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let contents = shellexpand::env_with_context_no_errors(contents, |var: &str| {
            match std::env::var(var) {
                Ok(val) => Some(val),
                Err(_) => {
                    warn!(
                        variable = %var,
                        "Environment variable not defined, using empty string"
                    );
                    Some(String::new())
                }
            }
        });

        toml::from_str(&contents)
            .map_err(|e| SdkError::Config(format!("failed to parse config: {}", e)))
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.url = url.into();
        self
    }

    /// Check the settings a worker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.identity.trim().is_empty() {
            return Err(SdkError::Config("identity is required".into()));
        }
        if self.gateway.url.trim().is_empty() {
            return Err(SdkError::Config("gateway.url is required".into()));
        }
        let connection = &self.connection;
        if connection.probe_timeout_ms == 0 {
            return Err(SdkError::Config(
                "connection.probe_timeout_ms must be greater than zero".into(),
            ));
        }
        if connection.backoff_floor_ms == 0 {
            return Err(SdkError::Config(
                "connection.backoff_floor_ms must be greater than zero".into(),
            ));
        }
        if connection.backoff_floor_ms > connection.backoff_ceiling_ms {
            return Err(SdkError::Config(format!(
                "connection.backoff_floor_ms ({}) exceeds backoff_ceiling_ms ({})",
                connection.backoff_floor_ms, connection.backoff_ceiling_ms
            )));
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let connection = &self.connection;
        ConnectionConfig::new(self.identity.clone())
            .with_probe_timeout(Duration::from_millis(connection.probe_timeout_ms))
            .with_backoff(BackoffConfig {
                floor: Duration::from_millis(connection.backoff_floor_ms),
                ceiling: Duration::from_millis(connection.backoff_ceiling_ms),
                max_jitter: Duration::from_millis(connection.backoff_jitter_ms),
            })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        let gateway = &self.gateway;
        ChannelConfig::new(gateway.url.clone())
            .with_connect_timeout(Duration::from_millis(gateway.connect_timeout_ms))
            .with_keep_alive(KeepAliveConfig {
                interval: Duration::from_secs(gateway.keep_alive_interval_secs),
                timeout: Duration::from_secs(gateway.keep_alive_timeout_secs),
                while_idle: true,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = SdkConfig::default();
        assert!(config.identity.is_empty());
        assert_eq!(config.gateway.url, "http://127.0.0.1:50051");
        assert_eq!(config.connection.probe_timeout_ms, 2000);
        assert_eq!(config.connection.backoff_floor_ms, 1000);
        assert_eq!(config.connection.backoff_ceiling_ms, 10_000);
        assert_eq!(config.connection.backoff_jitter_ms, 300);
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = SdkConfig::from_toml_str(
            r#"
identity = "worker-7"

[connection]
backoff_ceiling_ms = 30000
"#,
        )
        .unwrap();
        assert_eq!(config.identity, "worker-7");
        assert_eq!(config.connection.backoff_ceiling_ms, 30_000);
        assert_eq!(config.connection.backoff_floor_ms, 1000);
        assert_eq!(config.gateway.url, "http://127.0.0.1:50051");
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("TASKLINK_TEST_GATEWAY_URL", "https://coordinator.internal:443");
        let config = SdkConfig::from_toml_str(
            r#"
[gateway]
url = "${TASKLINK_TEST_GATEWAY_URL}"
"#,
        )
        .unwrap();
        assert_eq!(config.gateway.url, "https://coordinator.internal:443");
        assert!(config.channel_config().use_tls);
    }

    #[test]
    fn test_undefined_env_var_expands_to_empty() {
        let config = SdkConfig::from_toml_str(
            r#"
identity = "${TASKLINK_TEST_SURELY_UNDEFINED_VAR}"
"#,
        )
        .unwrap();
        assert!(config.identity.is_empty());
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = SdkConfig::from_toml_str("identity = [").unwrap_err();
        assert!(matches!(err, SdkError::Config(msg) if msg.contains("failed to parse")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
identity = "from-file"

[gateway]
url = "http://10.0.0.5:7000"
connect_timeout_ms = 750
"#
        )
        .unwrap();

        let config = SdkConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.identity, "from-file");
        assert_eq!(config.gateway.url, "http://10.0.0.5:7000");
        assert_eq!(
            config.channel_config().connect_timeout,
            Some(Duration::from_millis(750))
        );
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = SdkConfig::load(Some(Path::new("/nonexistent/tasklink/agent.toml"))).unwrap_err();
        assert!(matches!(err, SdkError::Config(msg) if msg.contains("failed to read")));
    }

    #[test]
    fn test_validate() {
        let config = SdkConfig::default();
        assert!(config.validate().is_err(), "identity is required");

        let config = SdkConfig::default().with_identity("worker-1");
        assert!(config.validate().is_ok());

        let config = SdkConfig::default()
            .with_identity("worker-1")
            .with_gateway_url("  ");
        assert!(config.validate().is_err());

        let mut config = SdkConfig::default().with_identity("worker-1");
        config.connection.backoff_floor_ms = 20_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SdkError::Config(msg) if msg.contains("exceeds")));

        let mut config = SdkConfig::default().with_identity("worker-1");
        config.connection.backoff_floor_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SdkConfig::default().with_identity("worker-1");
        config.connection.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config_conversion() {
        let mut config = SdkConfig::default().with_identity("worker-1");
        config.connection.probe_timeout_ms = 500;
        config.connection.backoff_jitter_ms = 0;

        let connection = config.connection_config();
        assert_eq!(connection.identity, "worker-1");
        assert_eq!(connection.probe_timeout, Duration::from_millis(500));
        assert_eq!(connection.backoff.floor, Duration::from_millis(1000));
        assert_eq!(connection.backoff.ceiling, Duration::from_millis(10_000));
        assert_eq!(connection.backoff.max_jitter, Duration::ZERO);
    }
}
