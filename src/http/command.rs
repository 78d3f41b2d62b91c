//! Per-request command and its dispatcher.
//!
//! # Lifecycle
//! ```text
//! request arrives
//!     → Dispatcher::handle → Command::new
//!     → dispatch():
//!         classify pressure        (Reject → 503, driver untouched)
//!         take concurrency permit  (none → 429)
//!         parse DriverRequest      (malformed → 400)
//!         spawn Driver::execute
//!         wait for first chunk or termination, at most request_secs
//!             error first  → error response
//!             chunk first  → 200, body streams the rest
//!             deadline     → 504, driver cancelled
//!     → response written, or client gone → cancellation
//! ```
//!
//! Only commands the driver accepted are labelled by name in metrics;
//! everything rejected on the way is counted as `unknown`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::admission::{classify, Admission};
use crate::driver::{DriverError, ExecutionMode, OutputSink};
use crate::http::body::{count_input, CancelOnDrop, CommandStream};
use crate::http::request::{self, RequestIdExt, X_YT_EXECUTION_MODE};
use crate::http::response::{content_type_for, DispatchError};
use crate::http::server::AppState;
use crate::observability::metrics;

/// Per-request handler bound once to the shared state.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        Command::new(self.state.clone(), request).dispatch().await
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// One inbound request on its way to the driver.
pub struct Command {
    state: Arc<AppState>,
    request: Request<Body>,
    request_id: String,
    started: Instant,
}

impl Command {
    pub fn new(state: Arc<AppState>, request: Request<Body>) -> Self {
        let request_id = request.request_id().to_string();
        Self {
            state,
            request,
            request_id,
            started: Instant::now(),
        }
    }

    /// Drive the request to a response. Errors never escape.
    pub async fn dispatch(self) -> Response {
        let Command {
            state,
            request,
            request_id,
            started,
        } = self;

        let command = request::command_path(request.uri().path())
            .map(|path| path.command)
            .ok();
        let bytes_in = Arc::new(AtomicU64::new(0));

        let outcome = tokio::time::timeout(
            state.request_timeout,
            execute(&state, request, &request_id, &bytes_in),
        )
        .await
        .unwrap_or_else(|_| {
            Err(DispatchError::Timeout {
                secs: state.request_timeout.as_secs(),
            })
        });

        let (response, label) = match outcome {
            Ok(response) => (
                response,
                command.as_deref().unwrap_or(metrics::UNKNOWN_COMMAND),
            ),
            Err(err) => {
                log_failure(
                    &err,
                    &request_id,
                    command.as_deref().unwrap_or(metrics::UNKNOWN_COMMAND),
                );
                metrics::record_bytes_in(metrics::UNKNOWN_COMMAND, bytes_in.load(Ordering::Relaxed));
                (err.into_response_for(&request_id), metrics::UNKNOWN_COMMAND)
            }
        };

        metrics::record_request(label, response.status().as_u16(), started);
        response
    }
}

fn log_failure(err: &DispatchError, request_id: &str, command: &str) {
    match err {
        DispatchError::Overloaded { .. } | DispatchError::TooManyRequests { .. } => {
            tracing::warn!(request_id = %request_id, command = %command, error = %err, "Request rejected")
        }
        DispatchError::BadRequest(_) => {
            tracing::info!(request_id = %request_id, command = %command, error = %err, "Bad request")
        }
        DispatchError::Timeout { .. } => {
            tracing::warn!(request_id = %request_id, command = %command, error = %err, "Driver timed out")
        }
        DispatchError::Driver(e) if e.is_cancelled() => {
            tracing::debug!(request_id = %request_id, command = %command, "Driver stopped after cancellation")
        }
        DispatchError::Driver(e) => tracing::error!(
            request_id = %request_id,
            command = %command,
            status = e.status,
            error = %e.message,
            "Driver error"
        ),
    }
}

async fn execute(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
    bytes_in: &Arc<AtomicU64>,
) -> Result<Response, DispatchError> {
    let sample = state.watcher.current_pressure();
    let band = classify(sample, &state.watermarks);
    metrics::record_admission(band);

    let mode = match band {
        Admission::Reject => {
            return Err(DispatchError::Overloaded {
                pressure: sample.bytes,
                high_watermark: state.watermarks.high,
            })
        }
        Admission::Degraded => ExecutionMode::Degraded,
        Admission::Normal => ExecutionMode::Normal,
    };

    let permit = state
        .limiter
        .try_acquire()
        .ok_or(DispatchError::TooManyRequests {
            limit: state.limiter.limit(),
        })?;

    let (parts, body) = request.into_parts();
    let driver_request = request::driver_request(&parts, request_id, mode)?;
    let command = driver_request.command.clone();
    let content_type = content_type_for(driver_request.output_format.as_deref());

    let capacity = match mode {
        ExecutionMode::Normal => state.dispatch.output_buffer_chunks,
        ExecutionMode::Degraded => state.dispatch.degraded_buffer_chunks,
    };
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    let mut guard = CancelOnDrop::new(cancel.clone(), request_id);

    tracing::debug!(
        request_id = %request_id,
        command = %command,
        driver = state.driver.name(),
        pressure = sample.bytes,
        mode = %mode,
        "Dispatching command"
    );

    let mut task = tokio::spawn(state.driver.execute(
        driver_request,
        count_input(body, bytes_in.clone()),
        OutputSink::new(tx),
        cancel,
    ));

    let first = tokio::select! {
        biased;
        chunk = rx.recv() => match chunk {
            Some(chunk) => Some(chunk),
            // Sink dropped without output: collect the driver's verdict.
            None => {
                settle((&mut task).await, &mut guard)?;
                None
            }
        },
        joined = &mut task => {
            settle(joined, &mut guard)?;
            None
        }
    };
    let task = first.is_some().then_some(task);

    let stream = CommandStream {
        first,
        rx,
        task,
        guard,
        permit: Some(permit),
        command,
        request_id: request_id.to_string(),
        bytes_in: bytes_in.clone(),
        bytes_out: 0,
    };

    let mut response = Response::new(stream.into_body());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(X_YT_EXECUTION_MODE, HeaderValue::from_static(mode.as_str()));
    Ok(response)
}

/// The driver returned before producing output.
fn settle(
    joined: Result<Result<(), DriverError>, JoinError>,
    guard: &mut CancelOnDrop,
) -> Result<(), DispatchError> {
    guard.disarm();
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(DriverError::new(500, format!("driver task failed: {}", e)).into()),
    }
}
