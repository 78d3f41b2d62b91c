//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Extract the API version and command name from the path
//! - Merge query string and `X-YT-Parameters` into driver parameters
//! - Prepare the `DriverRequest` handed to the driver
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Header parameters override query parameters of the same name
//! - Parsing never touches the body; it is streamed to the driver untouched

use axum::http::{request::Parts, HeaderMap, HeaderValue, Request};
use serde_json::{Map, Value};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::driver::{DriverRequest, ExecutionMode};
use crate::http::response::DispatchError;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_YT_PARAMETERS: &str = "x-yt-parameters";
pub const X_YT_INPUT_FORMAT: &str = "x-yt-input-format";
pub const X_YT_OUTPUT_FORMAT: &str = "x-yt-output-format";
pub const X_YT_EXECUTION_MODE: &str = "x-yt-execution-mode";

/// Generates UUID v4 request ids for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Access to the request id set by the request id layer.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers().request_id()
    }
}

/// API versions a client may name in an `/api/<version>/` prefix.
pub const API_VERSIONS: &[&str] = &["v3", "v4"];

/// Where a request path points: an optional API version and the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPath {
    pub api_version: Option<String>,
    pub command: String,
}

fn looks_like_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Parse `/read_table`, `/api/read_table` or `/api/v4/read_table`.
pub fn command_path(path: &str) -> Result<CommandPath, DispatchError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    let mut api_version = None;

    if segments.peek() == Some(&"api") {
        segments.next();
        if let Some(version) = segments.next_if(|s| looks_like_version(s)) {
            if !API_VERSIONS.contains(&version) {
                return Err(DispatchError::BadRequest(format!(
                    "unsupported API version '{}'",
                    version
                )));
            }
            api_version = Some(version.to_string());
        }
    }

    let rest: Vec<&str> = segments.collect();
    let command = match rest.as_slice() {
        [command] => *command,
        [] => return Err(DispatchError::BadRequest("missing command name".into())),
        _ => {
            return Err(DispatchError::BadRequest(format!(
                "malformed command path '{}'",
                path
            )))
        }
    };

    if !command
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(DispatchError::BadRequest(format!(
            "invalid command name '{}'",
            command
        )));
    }

    Ok(CommandPath {
        api_version,
        command: command.to_string(),
    })
}

/// Query string pairs, then the JSON object from `X-YT-Parameters` on top.
pub fn parameters(query: Option<&str>, headers: &HeaderMap) -> Result<Map<String, Value>, DispatchError> {
    let mut parameters = Map::new();

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parameters.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }

    if let Some(raw) = headers.get(X_YT_PARAMETERS) {
        let raw = raw
            .to_str()
            .map_err(|_| DispatchError::BadRequest("X-YT-Parameters is not valid UTF-8".into()))?;
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => parameters.extend(object),
            Ok(_) => {
                return Err(DispatchError::BadRequest(
                    "X-YT-Parameters must be a JSON object".into(),
                ))
            }
            Err(e) => {
                return Err(DispatchError::BadRequest(format!(
                    "X-YT-Parameters is not valid JSON: {}",
                    e
                )))
            }
        }
    }

    Ok(parameters)
}

fn header_string(headers: &HeaderMap, name: &str) -> Result<Option<String>, DispatchError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(|s| s.trim().to_string())
                .map_err(|_| DispatchError::BadRequest(format!("{} is not valid UTF-8", name)))
        })
        .transpose()
}

/// Build the driver command from the request head.
pub fn driver_request(
    parts: &Parts,
    request_id: &str,
    mode: ExecutionMode,
) -> Result<DriverRequest, DispatchError> {
    let CommandPath {
        api_version,
        command,
    } = command_path(parts.uri.path())?;

    Ok(DriverRequest {
        request_id: request_id.to_string(),
        command,
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        api_version,
        parameters: parameters(parts.uri.query(), &parts.headers)?,
        input_format: header_string(&parts.headers, X_YT_INPUT_FORMAT)?,
        output_format: header_string(&parts.headers, X_YT_OUTPUT_FORMAT)?,
        headers: parts.headers.clone(),
        mode,
    })
}
