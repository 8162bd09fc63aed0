//! Error types for the chat relay
//!
//! Framing errors are kept apart from application errors so the codec
//! can be used on its own by clients. Uses thiserror for ergonomic error
//! definitions.

use thiserror::Error;

/// Application-level errors
///
/// None of these cross a connection boundary: a handler that hits one
/// cleans up its own connection and nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal to the connection that produced it)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be built or read
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Attempted to write to a connection that was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid process configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Encoded header does not fit in the fixed header slot
    #[error("header is {len} bytes, must be under {limit}")]
    HeaderTooLarge { len: usize, limit: usize },

    /// Header announced a payload larger than the receiver accepts
    #[error("payload of {len} bytes exceeds limit of {limit}")]
    ContentTooLong { len: usize, limit: usize },

    /// Header could not be serialized
    #[error("header encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying stream error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
