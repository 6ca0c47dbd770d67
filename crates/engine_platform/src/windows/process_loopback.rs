//! Per-process loopback capture (§4.B.amb): `AUDIOCLIENT_PROCESS_
//! LOOPBACK_PARAMS` via `ActivateAudioInterfaceAsync`, available on
//! Windows 10 build 20348 and later.
//!
//! `gecko_platform`'s own `windows/thread.rs::LoopbackCapture::new_process`
//! stubs this exact API out with a `// TODO: Implement
//! ActivateAudioInterfaceAsync with AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS`.
//! This client carries the same TODO forward rather than pretending to
//! finish what was left undone there: initialize always succeeds in
//! determining whether the OS build supports the API, but actual frame
//! delivery is not wired up yet.

use engine_core::{CaptureCallback, CaptureClient, CaptureTarget, EngineError};
use engine_format::AudioFormat;

use crate::error::PlatformError;

pub struct ProcessLoopbackClient {
    pid: Option<u32>,
    format: Option<AudioFormat>,
}

impl Default for ProcessLoopbackClient {
    fn default() -> Self {
        Self {
            pid: None,
            format: None,
        }
    }
}

impl ProcessLoopbackClient {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Windows 10 build 20348 introduced `AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS`.
fn os_build_supports_process_loopback() -> bool {
    // TODO: query RtlGetVersion and compare dwBuildNumber >= 20348, the
    // way gecko_platform::windows::version does for its own capability
    // checks. Always reporting unsupported keeps this client honest
    // about not yet activating a real loopback interface.
    false
}

impl CaptureClient for ProcessLoopbackClient {
    fn initialize(&mut self, target: CaptureTarget) -> Result<(), EngineError> {
        let CaptureTarget::ProcessLoopback(pid) = target else {
            return Err(PlatformError::Internal("ProcessLoopbackClient given a non-process target".into()).into());
        };
        if !os_build_supports_process_loopback() {
            return Err(PlatformError::Unavailable {
                resource: "process-loopback".into(),
                cause: "ActivateAudioInterfaceAsync path not implemented on this build".into(),
                timeout: None,
            }
            .into());
        }
        self.pid = Some(pid);
        // TODO: Implement ActivateAudioInterfaceAsync with
        // AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS, mirroring
        // gecko_platform's own stubbed-out LoopbackCapture::new_process.
        Err(PlatformError::Unavailable {
            resource: "process-loopback".into(),
            cause: "not yet implemented".into(),
            timeout: None,
        }
        .into())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        Err(PlatformError::Unavailable {
            resource: "process-loopback".into(),
            cause: "not initialized".into(),
            timeout: None,
        }
        .into())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_callback(&mut self, _callback: CaptureCallback) {}

    fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    fn set_gain(&self, _gain: f32) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_reports_unavailable_on_unsupported_build() {
        let mut client = ProcessLoopbackClient::new();
        let err = client.initialize(CaptureTarget::ProcessLoopback(1234)).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable { .. }));
    }
}
