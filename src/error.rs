//! Error types for linkwire
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using WireError
pub type Result<T> = std::result::Result<T, WireError>;

/// Unified error type for linkwire operations
#[derive(Debug, Error)]
pub enum WireError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Startup Errors (fatal, surfaced from start/connect)
    // -------------------------------------------------------------------------
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Client is not connected")]
    NotConnected,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Cannot reply with a blank message")]
    BlankReply,

    #[error("A reply is already awaited on this connection")]
    CorrelationBusy,
}
