//! Top-level engine error type (§7).

use std::time::Duration;
use thiserror::Error;

/// The five error kinds §7 names, flat and non-nested like
/// `gecko_core::error::EngineError`. `engine_sinks`/`engine_platform`
/// define their own narrower enums that convert in at the boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config rejected: {field}: {reason}")]
    ConfigRejected { field: String, reason: String },

    /// `timeout` is set when this came from a bounded wait giving up
    /// (§9: the process-wide OS activation lock), and left `None` for
    /// every other unavailability (device missing, platform unsupported).
    #[error("unavailable: {resource}: {cause}{}", timeout.map(|t| format!(" (timed out after {t:?})")).unwrap_or_default())]
    Unavailable {
        resource: String,
        cause: String,
        timeout: Option<Duration>,
    },

    #[error("io failure on sink {sink}: {os_error}")]
    IoFailure { sink: String, os_error: String },

    #[error("stream fault on source {source}: {cause}")]
    StreamFault { source: String, cause: String },

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("sink error: {0}")]
    SinkError(#[from] engine_sinks::SinkError),

    #[error("format error: {0}")]
    FormatError(#[from] engine_format::FormatError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ConfigRejected {
            field: "sources".into(),
            reason: "must not be empty".into(),
        };
        assert!(err.to_string().contains("sources"));
    }

    #[test]
    fn test_from_sink_error() {
        let sink_err = engine_sinks::SinkError::ConfigRejected {
            reason: "bad path".into(),
        };
        let engine_err: EngineError = sink_err.into();
        assert!(matches!(engine_err, EngineError::SinkError(_)));
    }
}
