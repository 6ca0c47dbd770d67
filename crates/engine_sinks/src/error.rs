//! Sink error types

use thiserror::Error;

/// Errors raised by a sink's `configure`/`submit`/`close` lifecycle.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("config rejected: {reason}")]
    ConfigRejected { reason: String },

    #[error("io failure on {path}: {os_error}")]
    IoFailure { path: String, os_error: String },

    #[error("encoder failure: {0}")]
    EncoderFailure(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}
