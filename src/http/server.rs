//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatcher as fallback
//! - Wire up middleware (tracing, request ID, CORS)
//! - Serve the status endpoint
//! - Bind server to listener and shut down gracefully

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admission::{classify, Admission, ConcurrencyLimiter, PressureSample, ResourceWatcher};
use crate::config::{DispatchConfig, Watermarks};
use crate::driver::Driver;
use crate::http::command::Dispatcher;
use crate::http::middleware::cors_middleware;
use crate::http::request::UuidRequestId;
use crate::lifecycle::shutdown::wait_for_shutdown;
use crate::lifecycle::Application;

/// Process-wide state shared by every command.
pub struct AppState {
    pub driver: Arc<dyn Driver>,
    pub watcher: Arc<ResourceWatcher>,
    pub watermarks: Watermarks,
    pub limiter: ConcurrencyLimiter,
    pub dispatch: DispatchConfig,
    /// Longest wait for a command's first output.
    pub request_timeout: Duration,
}

/// Body of `GET /_status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub driver: &'static str,
    pub pressure: PressureSample,
    pub watermarks: Watermarks,
    pub admission: Admission,
    pub in_flight: usize,
}

/// Build the Axum router with all middleware layers.
///
/// The request deadline is enforced by the dispatcher so that a timeout is
/// answered like any other dispatch error.
pub fn build_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/_status", get(status_handler))
        .fallback(dispatch_handler)
        .with_state(dispatcher)
        .layer(middleware::from_fn(cors_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(TraceLayer::new_for_http())
}

async fn dispatch_handler(State(dispatcher): State<Dispatcher>, request: Request<Body>) -> Response {
    dispatcher.handle(request).await
}

async fn status_handler(State(dispatcher): State<Dispatcher>) -> Json<StatusReport> {
    let state = dispatcher.state();
    let pressure = state.watcher.current_pressure();
    Json(StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        driver: state.driver.name(),
        pressure,
        watermarks: state.watermarks,
        admission: classify(pressure, &state.watermarks),
        in_flight: state.limiter.in_flight(),
    })
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    application: Application,
}

impl HttpServer {
    pub fn new(application: Application) -> Self {
        let router = application.router();
        Self {
            router,
            application,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        self.application.shutdown();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn application(&self) -> &Application {
        &self.application
    }
}
