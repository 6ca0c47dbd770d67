//! OS-backed capture/output bindings and the enumerator collaborators
//! (§4.B.amb, §4.I.amb). `engine_core` defines the contracts this crate
//! implements; this crate is the only one in the workspace with
//! platform-specific `cfg` modules, mirroring the split between
//! `gecko_dsp` (no OS deps) and `gecko_platform` (all of them).

mod cpal_client;
mod device;
mod error;
mod process;

#[cfg(target_os = "windows")]
mod windows;

use engine_core::{CaptureClient, CaptureTarget, EngineError};

pub use cpal_client::CpalCaptureClient;
pub use device::{enumerate_devices, AudioDeviceInfo, DeviceDirection};
pub use error::PlatformError;
pub use process::{enumerate_audio_processes, ProcessInfo};

#[cfg(target_os = "windows")]
pub use windows::ProcessLoopbackClient;

/// Whether this build can service `CaptureTarget::ProcessLoopback` at
/// all (§9's open question on process loopback support).
pub fn supports_process_loopback() -> bool {
    #[cfg(target_os = "windows")]
    {
        false // see windows::process_loopback's TODO: API not yet wired up
    }
    #[cfg(not(target_os = "windows"))]
    {
        false
    }
}

/// Construct the concrete `CaptureClient` for `target`. This is the
/// function `engine_cli` passes to `Router::start_session` as its
/// `ClientFactory` (engine_core cannot depend on engine_platform
/// directly, so the binding happens at the call site).
pub fn make_capture_client(target: &CaptureTarget) -> Result<Box<dyn CaptureClient>, EngineError> {
    match target {
        CaptureTarget::ProcessLoopback(_pid) => {
            #[cfg(target_os = "windows")]
            {
                Ok(Box::new(ProcessLoopbackClient::new()))
            }
            #[cfg(not(target_os = "windows"))]
            {
                Err(PlatformError::Unavailable {
                    resource: "process-loopback".into(),
                    cause: "only implemented on Windows".into(),
                    timeout: None,
                }
                .into())
            }
        }
        _ => Ok(Box::new(CpalCaptureClient::new())),
    }
}
