//! Observability middleware for request tracking and metrics.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::metrics::METRICS;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Type alias for the middleware future.
type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type alias for middleware function pointer.
type MiddlewareFn = fn(Request, Next) -> MiddlewareFuture;

/// Type alias for the middleware layer.
pub type MiddlewareLayer = axum::middleware::FromFnLayer<MiddlewareFn, (), (Request,)>;

/// Request ID extension type.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Create a request ID layer.
///
/// Reuses an incoming `x-request-id` or generates one, runs the request
/// inside a span carrying it, and echoes it on the response.
pub fn request_id_layer() -> MiddlewareLayer {
    axum::middleware::from_fn(request_id_middleware_fn)
}

fn request_id_middleware_fn(mut request: Request, next: Next) -> MiddlewareFuture {
    Box::pin(async move {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        request
            .extensions_mut()
            .insert(RequestId(request_id.clone()));

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );

        let mut response = next.run(request).instrument(span).await;

        if let Ok(header_value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), header_value);
        }

        response
    })
}

/// Create a metrics layer.
pub fn metrics_layer() -> MiddlewareLayer {
    axum::middleware::from_fn(metrics_middleware_fn)
}

fn metrics_middleware_fn(request: Request, next: Next) -> MiddlewareFuture {
    Box::pin(async move {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();

        METRICS.http_active_connections.inc();

        let response = next.run(request).await;

        METRICS.http_active_connections.dec();

        let duration = start.elapsed().as_secs_f64();
        let status = response.status().as_u16();

        METRICS.record_http_request(&method, &path, status, duration);

        tracing::debug!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %format!("{:.2}", duration * 1000.0),
            "Request completed"
        );

        response
    })
}
