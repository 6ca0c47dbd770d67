//! Platform error taxonomy, converting into `engine_core::EngineError`
//! at the boundary (§7.amb).

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),

    #[error("resource unavailable: {resource}: {cause}")]
    Unavailable {
        resource: String,
        cause: String,
        timeout: Option<Duration>,
    },

    /// The process-wide OS activation lock (§9) was still held by
    /// another capture/sink after `timeout` elapsed.
    #[error("activation lock timed out after {timeout:?} acquiring {resource}")]
    ActivationTimedOut { resource: String, timeout: Duration },

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("stream build failed: {0}")]
    StreamBuildFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PlatformError> for engine_core::EngineError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::UnsupportedPlatform(what) => engine_core::EngineError::Unavailable {
                resource: what,
                cause: "not supported on this platform".into(),
                timeout: None,
            },
            PlatformError::Unavailable { resource, cause, timeout } => {
                engine_core::EngineError::Unavailable { resource, cause, timeout }
            }
            PlatformError::ActivationTimedOut { resource, timeout } => engine_core::EngineError::Unavailable {
                resource,
                cause: "process-wide OS activation lock was held by another capture/sink".into(),
                timeout: Some(timeout),
            },
            PlatformError::DeviceNotFound(id) => engine_core::EngineError::Unavailable {
                resource: id,
                cause: "device not found".into(),
                timeout: None,
            },
            PlatformError::StreamBuildFailed(cause) => engine_core::EngineError::Unavailable {
                resource: "audio stream".into(),
                cause,
                timeout: None,
            },
            PlatformError::Internal(msg) => engine_core::EngineError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_engine_error() {
        let err = PlatformError::DeviceNotFound("xyz".into());
        let engine_err: engine_core::EngineError = err.into();
        assert!(matches!(engine_err, engine_core::EngineError::Unavailable { .. }));
    }

    #[test]
    fn test_activation_timeout_carries_duration_through() {
        let err = PlatformError::ActivationTimedOut {
            resource: "cpal input stream".into(),
            timeout: Duration::from_secs(5),
        };
        let engine_err: engine_core::EngineError = err.into();
        match engine_err {
            engine_core::EngineError::Unavailable { timeout, .. } => {
                assert_eq!(timeout, Some(Duration::from_secs(5)));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
