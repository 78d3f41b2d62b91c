//! Startup orchestration.
//!
//! # Responsibilities
//! - Configure process-wide singletons once (logging, metrics exporter)
//! - Build the async runtime with the configured sizing
//! - Compute watermarks, construct the driver and the resource watcher
//! - Hand out the per-request dispatcher
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Heavy resources are created once and shared; a request allocates
//!   only its `Command`

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::admission::{ConcurrencyLimiter, PressureProbe, ProcessMemoryProbe, ResourceWatcher};
use crate::config::validation::validate_config;
use crate::config::{compute_watermarks, ConfigError, ProxyConfig, RuntimeConfig, Watermarks};
use crate::driver::{Driver, UpstreamDriver};
use crate::http::command::Dispatcher;
use crate::http::server::{build_router, AppState};
use crate::observability::{logging, metrics};

static SINGLETONS: Once = Once::new();

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to create pressure probe: {0}")]
    Probe(String),
}

/// Install logging and, when enabled, the metrics exporter.
///
/// Runs at most once per process; later calls do nothing. The metrics
/// exporter needs a Tokio runtime.
pub fn configure_singletons(config: &ProxyConfig) {
    SINGLETONS.call_once(|| {
        logging::init_logging(&config.observability);

        if config.observability.metrics_enabled {
            match config.observability.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(_) => tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        tracing::info!(
            log_level = %config.observability.log_level,
            metrics_enabled = config.observability.metrics_enabled,
            "Process singletons configured"
        );
    });
}

fn validate(config: &ProxyConfig) -> Result<(), StartupError> {
    validate_config(config).map_err(|e| StartupError::Config(ConfigError::Validation(e)))
}

/// Build the multi-threaded runtime the proxy runs on.
pub fn build_runtime(config: &RuntimeConfig) -> Result<Runtime, StartupError> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder
        .enable_all()
        .thread_name("yt-proxy-worker")
        .max_blocking_threads(config.max_blocking_threads.max(1));
    if config.worker_threads > 0 {
        builder.worker_threads(config.worker_threads);
    }
    builder.build().map_err(StartupError::Runtime)
}

/// The initialized proxy: shared state plus the config it came from.
pub struct Application {
    state: Arc<AppState>,
    config: Arc<ProxyConfig>,
}

impl Application {
    /// Initialize with the upstream driver and process memory probe.
    ///
    /// Singletons are configured before the driver is built. Must be called
    /// from within a Tokio runtime.
    pub fn init(config: ProxyConfig) -> Result<Self, StartupError> {
        validate(&config)?;
        configure_singletons(&config);

        let driver = Arc::new(UpstreamDriver::new(&config.driver, &config.timeouts));
        let probe = Arc::new(ProcessMemoryProbe::new().map_err(StartupError::Probe)?);
        Self::with_components(config, driver, probe)
    }

    /// Initialize with an explicit driver and pressure probe.
    pub fn with_components(
        config: ProxyConfig,
        driver: Arc<dyn Driver>,
        probe: Arc<dyn PressureProbe>,
    ) -> Result<Self, StartupError> {
        validate(&config)?;
        configure_singletons(&config);

        let watermarks = compute_watermarks(&config.memory);
        if !watermarks.is_consistent() || watermarks.high > config.memory.memory_limit {
            tracing::warn!(
                memory_limit = config.memory.memory_limit,
                low_watermark = watermarks.low,
                high_watermark = watermarks.high,
                "Watermarks are inconsistent with each other or the memory limit; using them as given"
            );
        }
        tracing::info!(
            memory_limit = config.memory.memory_limit,
            low_watermark = watermarks.low,
            high_watermark = watermarks.high,
            "Watermarks computed"
        );

        let watcher = ResourceWatcher::start(probe, Duration::from_millis(config.watcher.interval_ms));

        tracing::info!(
            driver = driver.name(),
            concurrency_limit = config.dispatch.concurrency_limit,
            "Driver ready"
        );

        let state = Arc::new(AppState {
            driver,
            watcher,
            watermarks,
            limiter: ConcurrencyLimiter::new(config.dispatch.concurrency_limit),
            dispatch: config.dispatch.clone(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        });

        Ok(Self {
            state,
            config: Arc::new(config),
        })
    }

    /// Per-request handler sharing this application's singletons.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.state.clone())
    }

    /// Router with the full middleware chain in front of the dispatcher.
    pub fn router(&self) -> Router {
        build_router(self.dispatcher())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn watermarks(&self) -> Watermarks {
        self.state.watermarks
    }

    pub fn watcher(&self) -> &Arc<ResourceWatcher> {
        &self.state.watcher
    }

    /// Stop background work. In-flight commands keep their shared state.
    pub fn shutdown(&self) {
        self.state.watcher.stop();
        tracing::info!("Application shut down");
    }
}
