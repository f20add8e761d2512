//! Prometheus metrics collection.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - WebSocket sessions and rejected upgrades
//! - Hub counters (rooms, evictions, signaling)

use chirm_realtime::HubStats;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path pattern
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Inbound command labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CommandLabels {
    /// Command tag, or `invalid`.
    pub command: String,
}

/// Rejected upgrade labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectLabels {
    /// `unauthorized`, `origin` or `capacity`.
    pub reason: String,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// HTTP requests in flight.
    pub http_active_connections: Gauge,
    /// WebSocket active connections.
    pub websocket_connections: Gauge,
    /// WebSocket sessions accepted since start.
    pub websocket_sessions_total: Counter,
    /// WebSocket upgrades refused.
    pub websocket_rejected_total: Family<RejectLabels, Counter>,
    /// Inbound commands by tag.
    pub websocket_commands_total: Family<CommandLabels, Counter>,
    /// Active voice rooms.
    pub voice_rooms_active: Gauge,
    /// Connections evicted for not draining their queue.
    pub evicted_connections: Gauge,
    /// Signals forwarded to a co-member.
    pub signals_relayed: Gauge,
    /// Signals dropped by the co-membership check.
    pub signals_dropped: Gauge,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // HTTP metrics
        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "chirm_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "chirm_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_connections = Gauge::default();
        registry.register(
            "chirm_http_active_connections",
            "Number of HTTP requests in flight",
            http_active_connections.clone(),
        );

        // WebSocket metrics
        let websocket_connections = Gauge::default();
        registry.register(
            "chirm_websocket_connections",
            "Active WebSocket connections",
            websocket_connections.clone(),
        );

        let websocket_sessions_total = Counter::default();
        registry.register(
            "chirm_websocket_sessions",
            "WebSocket sessions accepted",
            websocket_sessions_total.clone(),
        );

        let websocket_rejected_total = Family::<RejectLabels, Counter>::default();
        registry.register(
            "chirm_websocket_rejected",
            "WebSocket upgrades refused",
            websocket_rejected_total.clone(),
        );

        let websocket_commands_total = Family::<CommandLabels, Counter>::default();
        registry.register(
            "chirm_websocket_commands",
            "Inbound WebSocket commands by type",
            websocket_commands_total.clone(),
        );

        // Hub metrics
        let voice_rooms_active = Gauge::default();
        registry.register(
            "chirm_voice_rooms_active",
            "Voice rooms with at least one member",
            voice_rooms_active.clone(),
        );

        let evicted_connections = Gauge::default();
        registry.register(
            "chirm_evicted_connections",
            "Connections evicted because their send queue was full",
            evicted_connections.clone(),
        );

        let signals_relayed = Gauge::default();
        registry.register(
            "chirm_signals_relayed",
            "Signaling messages forwarded",
            signals_relayed.clone(),
        );

        let signals_dropped = Gauge::default();
        registry.register(
            "chirm_signals_dropped",
            "Signaling messages dropped between non-members",
            signals_dropped.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_active_connections,
            websocket_connections,
            websocket_sessions_total,
            websocket_rejected_total,
            websocket_commands_total,
            voice_rooms_active,
            evicted_connections,
            signals_relayed,
            signals_dropped,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record an inbound command.
    pub fn record_command(&self, command: &str) {
        self.websocket_commands_total
            .get_or_create(&CommandLabels {
                command: command.to_string(),
            })
            .inc();
    }

    /// Record a refused upgrade.
    pub fn record_rejection(&self, reason: &str) {
        self.websocket_rejected_total
            .get_or_create(&RejectLabels {
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Copy the hub's counters into the gauges.
    pub fn observe_hub(&self, stats: &HubStats) {
        self.websocket_connections
            .set(stats.current_connections as i64);
        self.voice_rooms_active.set(stats.active_rooms as i64);
        self.evicted_connections
            .set(stats.evicted_connections as i64);
        self.signals_relayed.set(stats.signals_relayed as i64);
        self.signals_dropped.set(stats.signals_dropped as i64);
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

/// Normalize path for metrics (replace dynamic segments).
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|part| if is_dynamic_segment(part) { ":param" } else { part })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a path segment is dynamic.
fn is_dynamic_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    // UUID pattern
    if segment.len() == 36 && segment.contains('-') {
        return true;
    }
    segment.chars().all(|c| c.is_ascii_digit())
}
