//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the HTTP proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Memory limit and admission watermarks.
    pub memory: MemoryConfig,

    /// Resource watcher sampling settings.
    pub watcher: WatcherConfig,

    /// Per-command dispatch settings.
    pub dispatch: DispatchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Execution driver settings.
    pub driver: DriverConfig,

    /// Process-wide runtime sizing.
    pub runtime: RuntimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
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

/// Memory limit of the proxy process and the admission watermarks.
///
/// Watermarks left out of the file are derived from `memory_limit`
/// by [`crate::config::watermarks::compute_watermarks`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory limit in bytes.
    pub memory_limit: u64,

    /// Throttle threshold in bytes. Requests above it run degraded.
    pub low_watermark: Option<u64>,

    /// Hard-reject threshold in bytes.
    pub high_watermark: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_limit: 2 * 1024 * 1024 * 1024, // 2GB
            low_watermark: None,
            high_watermark: None,
        }
    }
}

/// Resource watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Sampling interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Settings applied to every dispatched command.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Driver output chunks buffered per request in normal mode.
    pub output_buffer_chunks: usize,

    /// Driver output chunks buffered per request in degraded mode.
    pub degraded_buffer_chunks: usize,

    /// Maximum number of in-flight commands (0 = unlimited).
    pub concurrency_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            output_buffer_chunks: 16,
            degraded_buffer_chunks: 2,
            concurrency_limit: 0,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until response headers are produced, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Execution driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Address of the execution backend (e.g., "127.0.0.1:9013").
    pub upstream_address: String,

    /// API version segment used in upstream paths.
    pub api_version: String,

    /// Driver options passed through unmodified.
    pub options: toml::Table,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            upstream_address: "127.0.0.1:9013".to_string(),
            api_version: "v3".to_string(),
            options: toml::Table::new(),
        }
    }
}

/// Process-wide runtime sizing, applied once before anything else starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for the async runtime (0 = number of CPUs).
    pub worker_threads: usize,

    /// Upper bound for the blocking thread pool.
    pub max_blocking_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_blocking_threads: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Append logs to this file instead of writing them to stdout.
    pub log_file: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
