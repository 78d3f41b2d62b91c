//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse, known API version)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Watermarks are not checked against each other or the memory limit

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::http::request::API_VERSIONS;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address '{}'", config.listener.bind_address),
        ));
    }

    if config.memory.memory_limit == 0 {
        errors.push(ValidationError::new("memory.memory_limit", "must be greater than 0"));
    }

    if config.watcher.interval_ms == 0 {
        errors.push(ValidationError::new("watcher.interval_ms", "must be greater than 0"));
    }

    if config.dispatch.output_buffer_chunks == 0 {
        errors.push(ValidationError::new(
            "dispatch.output_buffer_chunks",
            "must be greater than 0",
        ));
    }

    if config.dispatch.degraded_buffer_chunks == 0 {
        errors.push(ValidationError::new(
            "dispatch.degraded_buffer_chunks",
            "must be greater than 0",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.driver.upstream_address.trim().is_empty() {
        errors.push(ValidationError::new("driver.upstream_address", "must not be empty"));
    }

    if !API_VERSIONS.contains(&config.driver.api_version.as_str()) {
        errors.push(ValidationError::new(
            "driver.api_version",
            format!(
                "unsupported API version '{}', expected one of {:?}",
                config.driver.api_version, API_VERSIONS
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "invalid socket address '{}'",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
