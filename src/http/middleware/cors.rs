//! Cross-origin policy middleware.
//!
//! # States
//! - Preflight: `OPTIONS`, answered here with the CORS headers and an empty body
//! - Forward: anything else continues down the chain; `GET` responses get
//!   `Access-Control-Allow-Origin: *` unless a handler already set one

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST, PUT, GET, OPTIONS";
pub const ALLOW_HEADERS: &str = "authorization, origin, content-type, accept, x-yt-parameters, x-yt-input-format, x-yt-output-format";
pub const MAX_AGE: &str = "3600";

/// What the middleware does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision {
    Preflight,
    Forward { allow_origin: bool },
}

impl CorsDecision {
    pub fn for_method(method: &Method) -> Self {
        if method == Method::OPTIONS {
            CorsDecision::Preflight
        } else {
            CorsDecision::Forward {
                allow_origin: method == Method::GET,
            }
        }
    }
}

/// Empty successful response carrying the preflight headers.
pub fn preflight_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE),
    );
    response
}

pub async fn cors_middleware(request: Request<Body>, next: Next) -> Response {
    match CorsDecision::for_method(request.method()) {
        CorsDecision::Preflight => {
            tracing::trace!(path = %request.uri().path(), "Answering CORS preflight");
            preflight_response()
        }
        CorsDecision::Forward { allow_origin } => {
            let mut response = next.run(request).await;
            if allow_origin {
                response
                    .headers_mut()
                    .entry(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                    .or_insert(HeaderValue::from_static(ALLOW_ORIGIN));
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::any, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/{*path}",
                any(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "dispatched"
                    }
                }),
            )
            .layer(middleware::from_fn(cors_middleware))
    }

    async fn send(method: Method, calls: Arc<AtomicUsize>) -> Response {
        let request = Request::builder()
            .method(method)
            .uri("/api/v3/get")
            .body(Body::empty())
            .unwrap();
        router(calls).oneshot(request).await.unwrap()
    }

    #[test]
    fn decisions() {
        assert_eq!(CorsDecision::for_method(&Method::OPTIONS), CorsDecision::Preflight);
        assert_eq!(
            CorsDecision::for_method(&Method::GET),
            CorsDecision::Forward { allow_origin: true }
        );
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            assert_eq!(
                CorsDecision::for_method(&method),
                CorsDecision::Forward { allow_origin: false }
            );
        }
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let response = send(Method::OPTIONS, calls.clone()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST, PUT, GET, OPTIONS"
        );
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization, origin, content-type, accept, x-yt-parameters, x-yt-input-format, x-yt-output-format"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
        assert_eq!(headers.len(), 4);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_forwarded_with_origin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let response = send(Method::GET, calls.clone()).await;

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_methods_forwarded_untouched() {
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let calls = Arc::new(AtomicUsize::new(0));
            let response = send(method.clone(), calls.clone()).await;

            let headers = response.headers();
            assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none(), "{}", method);
            assert!(headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_none());
            assert!(headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).is_none());
            assert!(headers.get(header::ACCESS_CONTROL_MAX_AGE).is_none());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
