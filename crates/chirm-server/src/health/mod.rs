//! # Health Check Module
//!
//! - **Liveness Probe**: is the process running?
//! - **Readiness Probe**: is the hub accepting connections?
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use chirm_server::health::{health_routes, HealthState};
//!
//! let health_state = HealthState::new(hub.clone());
//! health_state.set_ready(true);
//!
//! let app: Router<()> = Router::new().merge(health_routes(health_state));
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chirm_realtime::EventHub;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
}

/// Individual component health.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: HealthStatus,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Liveness check response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness component checks.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessChecks {
    /// Real-time (WebSocket) hub health.
    pub realtime: ComponentHealth,
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Version info.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Component checks.
    pub checks: ReadinessChecks,
}

/// Health state shared by the check handlers.
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    ready: Arc<AtomicBool>,
    hub: Arc<EventHub>,
}

impl HealthState {
    /// Create a new health state for `hub`. Starts not ready.
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
            hub,
        }
    }

    /// Get uptime in seconds.
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Set readiness state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if service is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// The hub is down once it would refuse new connections.
    fn realtime_health(&self) -> ComponentHealth {
        let stats = self.hub.stats();
        let max = self.hub.config().max_connections;
        let status = if stats.current_connections < max {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        ComponentHealth {
            status,
            details: Some(serde_json::json!({
                "connections": stats.current_connections,
                "max_connections": max,
                "voice_rooms": stats.active_rooms,
            })),
        }
    }

    fn readiness_checks(&self) -> ReadinessChecks {
        ReadinessChecks {
            realtime: self.realtime_health(),
        }
    }

    fn overall(&self, checks: &ReadinessChecks) -> HealthStatus {
        if self.is_ready() && checks.realtime.status == HealthStatus::Up {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        }
    }
}

/// Create health check routes.
pub fn health_routes<S>(state: HealthState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Overall health handler.
async fn health_handler(State(state): State<HealthState>) -> Response {
    let checks = state.readiness_checks();
    let status = state.overall(&checks);

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime(),
        checks,
    };

    (status_code(status), Json(response)).into_response()
}

/// Liveness check handler.
async fn liveness_handler(State(state): State<HealthState>) -> Response {
    let response = LivenessResponse {
        status: HealthStatus::Up,
        uptime_seconds: state.uptime(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness check handler.
async fn readiness_handler(State(state): State<HealthState>) -> Response {
    let checks = state.readiness_checks();
    let status = state.overall(&checks);
    (
        status_code(status),
        Json(serde_json::json!({ "status": status, "checks": checks })),
    )
        .into_response()
}
