//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map dispatch errors to HTTP status codes and JSON bodies
//! - Pick the content type of successful command output
//!
//! # Design Decisions
//! - Every error body carries the request id for correlation
//! - Overload answers 503 with `Retry-After`; the driver is never involved
//! - Client disconnects are not errors here: nobody is left to answer

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::driver::DriverError;

/// Why a command did not produce a successful response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("service overloaded: memory pressure {pressure} bytes reached high watermark {high_watermark} bytes")]
    Overloaded { pressure: u64, high_watermark: u64 },

    #[error("too many concurrent requests (limit {limit})")]
    TooManyRequests { limit: usize },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no output from the driver within {secs}s")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: String,
    request_id: &'a str,
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Driver(e) => e.http_status(),
        }
    }

    /// Well-formed error response tagged with the request id.
    pub fn into_response_for(self, request_id: &str) -> Response {
        let status = self.status();
        let message = match &self {
            DispatchError::Driver(e) => e.message.clone(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: status.as_u16(),
            message,
            request_id,
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, DispatchError::Overloaded { .. }) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Content type for a command's output format.
pub fn content_type_for(output_format: Option<&str>) -> &'static str {
    match output_format {
        Some("json") => "application/json",
        Some("yson") => "application/x-yt-yson-text",
        Some("dsv") | Some("schemaful_dsv") | Some("yamr") => "text/tab-separated-values",
        _ => "application/octet-stream",
    }
}
