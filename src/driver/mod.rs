//! Execution driver subsystem.
//!
//! # Data Flow
//! ```text
//! Command (one per request)
//!     → DriverRequest (command name, parameters, formats, mode)
//!     → Driver::execute(request, input body, output sink, cancel token)
//!     → OutputSink (bounded channel) → response body
//! ```
//!
//! # Design Decisions
//! - One driver per process, shared as `Arc<dyn Driver>`
//! - Output is written chunk by chunk; a full sink suspends the driver,
//!   so response backpressure reaches the execution
//! - Cancellation is advisory: drivers observe the token and stop early

pub mod upstream;

use std::fmt;

use axum::body::BodyDataStream;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use upstream::UpstreamDriver;

/// Request body as seen by a driver.
pub type InputStream = BodyDataStream;

/// How the driver should run a command given current memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Normal,
    /// Pressure is between the watermarks; the driver should economize.
    Degraded,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Normal => "normal",
            ExecutionMode::Degraded => "degraded",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command as handed to the driver.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    pub request_id: String,
    /// Command name, e.g. `read_table`.
    pub command: String,
    pub method: Method,
    pub path: String,
    /// API version from an `/api/<version>/` path prefix, if any.
    pub api_version: Option<String>,
    /// Query string pairs overlaid by the `X-YT-Parameters` object.
    pub parameters: Map<String, Value>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub headers: HeaderMap,
    pub mode: ExecutionMode,
}

/// Upstream execution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver error {status}: {message}")]
pub struct DriverError {
    /// Status reported by the execution side.
    pub status: u16,
    pub message: String,
    cancelled: bool,
}

impl DriverError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            cancelled: false,
        }
    }

    /// Failure inside the proxy before or while talking to the backend.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY.as_u16(), message)
    }

    /// The response side went away; nothing will read further output.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::new(499, "client closed request")
        }
    }

    /// True only for [`DriverError::cancelled`], never for a backend that
    /// answered 499 itself.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// HTTP status to report to the client. Anything that is not an
    /// error status becomes 502.
    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(self.status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY)
    }
}

/// Write side of a command's output. Dropping it ends the response body.
#[derive(Debug)]
pub struct OutputSink {
    tx: mpsc::Sender<Bytes>,
}

impl OutputSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Write one chunk, waiting while the response is not draining.
    ///
    /// Fails with [`DriverError::cancelled`] once the response is gone.
    pub async fn write(&self, chunk: Bytes) -> Result<(), DriverError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(chunk)
            .await
            .map_err(|_| DriverError::cancelled())
    }

    /// True once the reading side is dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Chunks buffered toward the response before `write` suspends.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Execution entry point shared by all commands of the process.
pub trait Driver: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Execute a command, streaming its result into `output`.
    ///
    /// The returned future must not capture `self` by reference; drivers
    /// clone whatever shared state they need.
    fn execute(
        &self,
        request: DriverRequest,
        input: InputStream,
        output: OutputSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), DriverError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(DriverError::new(404, "x").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DriverError::new(503, "x").http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(DriverError::new(200, "x").http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(DriverError::new(42, "x").http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(DriverError::new(1000, "x").http_status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn backend_499_is_not_a_cancellation() {
        let upstream = DriverError::new(499, "client closed request");
        assert!(!upstream.is_cancelled());
        assert!(DriverError::cancelled().is_cancelled());
        assert_ne!(upstream, DriverError::cancelled());
    }

    #[tokio::test]
    async fn sink_fails_after_reader_dropped() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = OutputSink::new(tx);

        sink.write(Bytes::from_static(b"a")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));

        drop(rx);
        assert!(sink.is_closed());
        let err = sink.write(Bytes::from_static(b"b")).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = OutputSink::new(tx);
        sink.write(Bytes::new()).await.unwrap();
        drop(sink);
        assert!(rx.recv().await.is_none());
    }
}
