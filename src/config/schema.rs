//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files and
//! default every field, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request and response size limits.
    pub limits: LimitsConfig,

    /// Worker pool for blocking resources.
    pub workers: WorkerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Body size limits, in bytes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request body accumulated in memory. Binary uploads stream in
    /// chunks of at most this size.
    pub max_request_size: usize,

    /// Largest encoded response body.
    pub max_response_size: usize,

    /// Number of pre-allocated buffers in the pool.
    pub buffers_per_region: usize,
}

impl LimitsConfig {
    /// Size of each pooled buffer.
    pub fn buffer_size(&self) -> usize {
        self.max_request_size.max(self.max_response_size)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 100 * 1024,
            max_response_size: 100 * 1024,
            buffers_per_region: 50,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Blocking resource calls allowed in flight at once.
    pub max_blocking: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_blocking: 16 }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error, or directives).
    pub log_level: String,

    /// Pretty or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.limits.max_request_size, 102_400);
        assert_eq!(config.limits.buffer_size(), 102_400);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [limits]
            max_response_size = 200000

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_request_size, 102_400);
        assert_eq!(config.limits.buffer_size(), 200_000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.workers.max_blocking, 16);
    }
}
