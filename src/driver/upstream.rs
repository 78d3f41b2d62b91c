//! Driver forwarding commands to an HTTP execution backend.
//!
//! # Responsibilities
//! - Build the upstream request: `/api/{version}/{command}` on the backend,
//!   keeping the version the client asked for
//! - Stream the client body up and the backend body down
//! - Turn non-success backend responses into `DriverError`
//! - Drop the backend exchange as soon as the command is cancelled

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio_util::sync::CancellationToken;

use crate::config::{DriverConfig, TimeoutConfig};
use crate::driver::{Driver, DriverError, DriverRequest, InputStream, OutputSink};
use crate::http::request::{
    X_REQUEST_ID, X_YT_EXECUTION_MODE, X_YT_INPUT_FORMAT, X_YT_OUTPUT_FORMAT, X_YT_PARAMETERS,
};

/// Longest error body kept from a failing backend response.
const MAX_ERROR_BODY: usize = 64 * 1024;

struct Inner {
    client: Client<HttpConnector, Body>,
    upstream_address: String,
    api_version: String,
    request_timeout: Duration,
}

/// Forwards every command to the configured backend.
#[derive(Clone)]
pub struct UpstreamDriver {
    inner: Arc<Inner>,
}

impl UpstreamDriver {
    pub fn new(driver: &DriverConfig, timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        tracing::info!(
            upstream = %driver.upstream_address,
            api_version = %driver.api_version,
            options = driver.options.len(),
            "Upstream driver created"
        );

        Self {
            inner: Arc::new(Inner {
                client,
                upstream_address: driver.upstream_address.clone(),
                api_version: driver.api_version.clone(),
                request_timeout: Duration::from_secs(timeouts.request_secs),
            }),
        }
    }

    /// Backend URI for a command. A version named by the client wins over
    /// the configured default.
    fn upstream_uri(&self, command: &str, api_version: Option<&str>) -> String {
        format!(
            "http://{}/api/{}/{}",
            self.inner.upstream_address,
            api_version.unwrap_or(&self.inner.api_version),
            command
        )
    }
}

impl Driver for UpstreamDriver {
    fn name(&self) -> &'static str {
        "upstream"
    }

    fn execute(
        &self,
        request: DriverRequest,
        input: InputStream,
        output: OutputSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), DriverError>> {
        let inner = self.inner.clone();
        let uri = self.upstream_uri(&request.command, request.api_version.as_deref());

        Box::pin(async move {
            let upstream = build_upstream_request(&uri, &request, input)?;

            tokio::select! {
                result = forward(&inner, upstream, &output) => result,
                _ = cancel.cancelled() => {
                    tracing::debug!(
                        request_id = %request.request_id,
                        command = %request.command,
                        "Upstream exchange cancelled"
                    );
                    Err(DriverError::cancelled())
                }
            }
        })
    }
}

fn build_upstream_request(
    uri: &str,
    request: &DriverRequest,
    input: InputStream,
) -> Result<Request<Body>, DriverError> {
    let parameters = serde_json::to_string(&request.parameters)
        .map_err(|e| DriverError::unavailable(format!("failed to encode parameters: {}", e)))?;

    let mut builder = Request::builder()
        .method(request.method.clone())
        .uri(uri)
        .header(X_YT_PARAMETERS, header_value(&parameters)?)
        .header(X_YT_EXECUTION_MODE, request.mode.as_str())
        .header(X_REQUEST_ID, header_value(&request.request_id)?);

    if let Some(format) = &request.input_format {
        builder = builder.header(X_YT_INPUT_FORMAT, header_value(format)?);
    }
    if let Some(format) = &request.output_format {
        builder = builder.header(X_YT_OUTPUT_FORMAT, header_value(format)?);
    }
    for name in [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = request.headers.get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(input))
        .map_err(|e| DriverError::unavailable(format!("failed to build upstream request: {}", e)))
}

fn header_value(value: &str) -> Result<HeaderValue, DriverError> {
    HeaderValue::from_str(value)
        .map_err(|_| DriverError::new(400, format!("value not allowed in a header: {:?}", value)))
}

async fn forward(
    inner: &Inner,
    request: Request<Body>,
    output: &OutputSink,
) -> Result<(), DriverError> {
    let response = tokio::time::timeout(inner.request_timeout, inner.client.request(request))
        .await
        .map_err(|_| DriverError::new(504, "upstream did not respond in time"))?
        .map_err(|e| DriverError::unavailable(format!("upstream request failed: {}", e)))?;

    let status = response.status();
    let mut body = Body::new(response.into_body()).into_data_stream();

    if !status.is_success() {
        let mut message = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| DriverError::new(status.as_u16(), format!("upstream body error: {}", e)))?;
            let room = MAX_ERROR_BODY.saturating_sub(message.len());
            message.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if room <= chunk.len() {
                break;
            }
        }
        let message = String::from_utf8_lossy(&message).trim().to_string();
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("upstream error").to_string()
        } else {
            message
        };
        return Err(DriverError::new(status.as_u16(), message));
    }

    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| DriverError::unavailable(format!("upstream stream broken: {}", e)))?;
        output.write(chunk).await?;
    }

    Ok(())
}
