//! HTTP API for the Chirm server.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chirm_realtime::EventHub;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthError, JwtValidator, TokenValidator};
use crate::config::ServerConfig;
use crate::health::{health_routes, HealthState};
use crate::observability::{metrics_layer, request_id_layer, METRICS};
use crate::realtime_api::realtime_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Real-time event hub.
    pub hub: Arc<EventHub>,
    /// Session token validator.
    pub validator: Arc<dyn TokenValidator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Health check state.
    pub health: HealthState,
}

impl AppState {
    /// Build state from a validated configuration.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(EventHub::with_config(config.hub_config()));
        let validator = Arc::new(JwtValidator::new(&config.jwt_secret));
        Self::with_parts(config, hub, validator)
    }

    /// Build state from explicit parts.
    pub fn with_parts(
        config: ServerConfig,
        hub: Arc<EventHub>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let health = HealthState::new(hub.clone());
        Self {
            hub,
            validator,
            config: Arc::new(config),
            health,
        }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("origin not allowed")]
    OriginRejected,
    #[error("server at capacity")]
    AtCapacity,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::OriginRejected => StatusCode::FORBIDDEN,
            ApiError::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(realtime_routes())
        .route("/metrics", get(metrics_handler))
        .merge(health_routes(state.health.clone()))
        .layer(metrics_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    METRICS.observe_hub(&state.hub.stats());
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        Body::from(METRICS.encode()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let response = ApiError::Auth(AuthError::MissingToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError::OriginRejected.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError::AtCapacity.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ApiError::Auth(AuthError::MissingToken).to_string(), "unauthorized");
        assert_eq!(ApiError::Auth(AuthError::InvalidToken).to_string(), "invalid token");
    }
}
