//! # Chirm Server
//!
//! HTTP and WebSocket front end for the Chirm real-time hub.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Chirm Server                     │
//! ├──────────────────────────────────────────────────────┤
//! │  HTTP Layer (axum)                                   │
//! │  • /ws                 authenticated WebSocket       │
//! │  • /api/voice/rooms    voice room snapshot           │
//! │  • /api/realtime/stats hub counters                  │
//! │  • /health, /metrics   checks and Prometheus         │
//! ├──────────────────────────────────────────────────────┤
//! │  Middleware: request id → trace → metrics            │
//! ├──────────────────────────────────────────────────────┤
//! │  chirm-realtime::EventHub                            │
//! │  connections · rooms · routing · signaling relay     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! CHIRM_JWT_SECRET=$(openssl rand -hex 32) cargo run --bin chirm-server
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router assembly, shared state and error responses
//! - [`auth`] - Session token extraction and validation
//! - [`config`] - Layered server configuration
//! - [`health`] - Liveness and readiness checks
//! - [`observability`] - Structured logging, metrics and request tracing
//! - [`realtime_api`] - WebSocket sessions and the voice room snapshot
//!
//! ## Example: Building the Router
//!
//! ```rust,no_run
//! use chirm_server::{api::{create_router, AppState}, config::ServerConfig};
//!
//! let config = ServerConfig {
//!     jwt_secret: "a-long-random-secret".to_string(),
//!     ..ServerConfig::default()
//! };
//! let state = AppState::new(config);
//! state.health.set_ready(true);
//! let app = create_router(state);
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod health;
pub mod observability;
pub mod realtime_api;

use std::future::Future;
use tokio::net::TcpListener;

use crate::api::{create_router, AppState};

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state.clone());
    state.health.set_ready(true);
    tracing::info!(addr = ?listener.local_addr().ok(), "Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    state.health.set_ready(false);
    result
}
