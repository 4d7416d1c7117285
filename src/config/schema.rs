//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the canary router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener and server-level timeouts.
    pub server: ServerConfig,

    /// Default backend receiving all non-canary traffic.
    pub main: TargetConfig,

    /// Backend receiving the canary share of traffic.
    pub canary: TargetConfig,

    /// Decision service consulted per request.
    pub sidecar: SidecarConfig,

    /// Fixed canary quota.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Path prefix removed before routing and forwarding.
    pub trim_prefix: String,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Deadline for receiving a request body, in seconds.
    pub read_timeout_secs: u64,

    /// Deadline for producing a response, in seconds.
    pub write_timeout_secs: u64,

    /// Liveness endpoint path. Never routed through the engine.
    pub health_path: String,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            read_timeout_secs: 30,
            write_timeout_secs: 60,
            health_path: "/application/health".to_string(),
        }
    }
}

/// Upstream target (main or canary).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TargetConfig {
    /// Upstream base URL (e.g., "http://main.internal:8080").
    pub url: String,

    /// Host header sent upstream. Empty keeps the client's Host.
    pub host_header: String,

    /// Transport settings for this target.
    pub client: ClientConfig,
}

/// Decision service ("sidecar") configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Decision service base URL. Empty disables consultation.
    pub url: String,

    /// Status code meaning "route to main". Required when `url` is set.
    pub main_status: Option<u16>,

    /// Status code meaning "route to canary". Required when `url` is set.
    pub canary_status: Option<u16>,

    /// Largest request body replayed to the decision service, in bytes.
    pub max_body_bytes: usize,

    /// Transport settings for the decision service.
    pub client: ClientConfig,
}

impl SidecarConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            main_status: None,
            canary_status: None,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            client: ClientConfig::default(),
        }
    }
}

/// Canary quota configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Total canary requests allowed for the process lifetime (0 = unlimited).
    pub request_limit_canary: u64,
}

/// HTTP client transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for receiving response headers, in milliseconds (0 = none).
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// How long an idle pooled connection is kept, in seconds.
    pub idle_timeout_secs: u64,

    /// Maximum idle pooled connections per upstream host.
    pub max_idle_per_host: usize,
}

impl ClientConfig {
    /// Response deadline, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            connect_timeout_ms: 5_000,
            idle_timeout_secs: 90,
            max_idle_per_host: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
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
            log_format: LogFormat::Compact,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
