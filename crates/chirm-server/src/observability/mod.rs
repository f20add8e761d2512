//! # Observability Module
//!
//! Observability for the Chirm server:
//!
//! - **Structured Logging**: pretty or JSON output with an env-driven filter
//! - **Prometheus Metrics**: HTTP traffic, WebSocket sessions and hub counters
//! - **Request Tracing**: `x-request-id` propagation into every request span
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use chirm_server::observability::{init_logging, request_id_layer};
//!
//! init_logging("info", true);
//!
//! let app: Router<()> = Router::new().layer(request_id_layer());
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsState, RejectLabels, METRICS};
pub use middleware::{metrics_layer, request_id_layer, MiddlewareLayer, RequestId, REQUEST_ID_HEADER};
