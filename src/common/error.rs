//! Error types for the Widgeteer client
//!
//! Transport failures are normally folded into a failed `Response` by the
//! command façade. This type is what travels underneath that boundary, and
//! what `Response::raise_for_error` hands back to callers that opt in.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Widgeteer client
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Not connected to server. Call connect() first")]
    NotConnected,

    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Server not available at {url} after {secs} seconds")]
    ServerUnavailable { url: String, secs: u64 },

    // === Request Errors ===
    #[error("Request '{id}' timed out after {secs:.1} seconds")]
    Timeout { id: String, secs: f64 },

    #[error("Request '{0}' was cancelled before a response arrived")]
    Cancelled(String),

    #[error("[{code}] {message}")]
    Command { code: String, message: String },

    // === Blocking Client Errors ===
    #[error("BlockingClient cannot be used from async code. Use WidgeteerClient directly instead")]
    NestedRuntime,

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Test Document Errors ===
    #[error("Failed to load test document '{path}': {reason}")]
    TestDocument { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a connection failed error
    pub fn connection_failed(url: &str, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a server-reported command error
    pub fn command(code: &str, message: &str) -> Self {
        Self::Command {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a test document error
    pub fn test_document(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::TestDocument {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Stable error code carried in `Response::error_code` for client-side failures
    pub fn code(&self) -> &str {
        match self {
            Error::NotConnected => "NOT_CONNECTED",
            Error::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Error::ConnectionClosed => "CONNECTION_CLOSED",
            Error::WebSocket(_) => "TRANSPORT_ERROR",
            Error::ServerUnavailable { .. } => "SERVER_UNAVAILABLE",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Cancelled(_) => "CANCELLED",
            Error::Command { code, .. } => code.as_str(),
            Error::NestedRuntime => "NESTED_RUNTIME",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            Error::TestDocument { .. } => "INVALID_TEST_DOCUMENT",
            Error::Io(_) | Error::FileRead { .. } => "IO_ERROR",
            Error::Json(_) => "DECODE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
