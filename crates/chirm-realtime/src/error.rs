//! Error types for the real-time hub.

use thiserror::Error;

/// Errors that can occur in real-time operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A required field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The hub refused a new connection.
    #[error("connection limit reached: max {0} connections")]
    ConnectionLimit(usize),

    /// The connection's outbound queue is full.
    #[error("send queue full")]
    QueueFull,

    /// The connection's outbound queue has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The event kind cannot be published by an external producer.
    #[error("event kind not publishable: {0}")]
    NotPublishable(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
