//! Configuration structures for InferLink
//!
//! Configurations are loaded from YAML files or assembled from `INFERLINK_*`
//! environment variables layered over defaults.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default server endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8001";

/// How tensor contents travel inside a request or response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarriageMode {
    /// Raw tensor bytes appended after a structured header
    #[default]
    Binary,

    /// Tensor values embedded as arrays in the structured body
    StructuredText,
}

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint
    pub endpoint: String,

    /// Tensor carriage mode
    #[serde(default)]
    pub carriage: CarriageMode,

    /// Ask for outputs as raw binary when using binary carriage
    #[serde(default = "default_binary_outputs")]
    pub binary_outputs: bool,

    /// Transport deadline per exchange in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Runtime used for dispatch
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Dispatch runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of runtime worker threads (0 = CPU count)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_metrics")]
    pub enable_metrics: bool,

    /// Enable structured (JSON) logging
    #[serde(default = "default_structured_logging")]
    pub structured_logging: bool,
}

/// Default value functions
fn default_binary_outputs() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_worker_threads() -> usize {
    0 // Means use CPU count
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics() -> bool {
    true
}

fn default_structured_logging() -> bool {
    false
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            enable_metrics: default_metrics(),
            structured_logging: default_structured_logging(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            carriage: CarriageMode::default(),
            binary_outputs: default_binary_outputs(),
            request_timeout_ms: default_request_timeout_ms(),
            runtime: RuntimeConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ClientError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: ClientConfig = serde_yaml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `INFERLINK_*` environment variables
    ///
    /// Nested keys use a double underscore, e.g.
    /// `INFERLINK_RUNTIME__WORKER_THREADS=4`.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("endpoint", DEFAULT_ENDPOINT)
            .map_err(|e| ClientError::config(e.to_string()))?
            .add_source(
                config::Environment::with_prefix("INFERLINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ClientError::config(format!("Failed to read environment: {}", e)))?;

        let config: ClientConfig = settings
            .try_deserialize()
            .map_err(|e| ClientError::config(format!("Invalid environment configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::config("endpoint must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::config("request_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoint: http://triton:8001\ncarriage: structured_text\nruntime:\n  worker_threads: 2\n"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();

        assert_eq!(config.endpoint, "http://triton:8001");
        assert_eq!(config.carriage, CarriageMode::StructuredText);
        assert_eq!(config.runtime.worker_threads, 2);
        assert!(config.binary_outputs);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.carriage, CarriageMode::Binary);

        let config = ClientConfig {
            endpoint: "  ".to_string(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            request_timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_unknown_carriage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint: http://triton:8001\ncarriage: carrier_pigeon").unwrap();

        assert!(matches!(
            ClientConfig::from_file(file.path()),
            Err(ClientError::Config(_))
        ));
    }
}
