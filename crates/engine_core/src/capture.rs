//! Capture client contract (§4.B) and input source wrapper (§4.C).
//!
//! `engine_core` owns the contract; `engine_platform` supplies the
//! concrete OS-backed implementations (cpal, WASAPI process loopback).
//! This mirrors the split between `gecko_core::stream`'s `AudioStream`
//! driver and `gecko_platform`'s per-OS backends, except here the seam
//! is an explicit trait rather than `cfg`-gated modules inside one
//! crate.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;
use crate::message::SourceId;
use engine_format::AudioFormat;

/// What a capture client should open (§4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTarget {
    SystemDefaultLoopback,
    ProcessLoopback(u32),
    DeviceCapture(String),
    DeviceLoopback(String),
}

/// Frame callback installed on a capture client. Invoked on the OS audio
/// thread: must not block, allocate unboundedly, or acquire contended
/// locks (§5).
pub type CaptureCallback = Box<dyn FnMut(&[u8]) + Send>;

/// One OS endpoint, one raw producer callback (§4.B).
///
/// State machine: `Idle -> Ready (initialize) -> Running (start) ->
/// Paused (pause) -> Running (resume)`; `stop` returns to `Ready` from
/// any state.
pub trait CaptureClient: Send {
    fn initialize(&mut self, target: CaptureTarget) -> Result<(), EngineError>;

    /// Idempotent.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Idempotent.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Must be installed before `start()`. Replacing the callback while
    /// running is allowed and takes effect on the next delivery.
    fn set_callback(&mut self, callback: CaptureCallback);

    /// Valid once `initialize` has succeeded.
    fn format(&self) -> Option<AudioFormat>;

    /// Thread-safe, lock-free; applied before callback delivery.
    fn set_gain(&self, gain: f32);

    /// While paused, callbacks are suppressed; the endpoint stays
    /// initialized.
    fn pause(&mut self);
    fn resume(&mut self);

    /// Attach a live render path that mirrors captured frames. Optional:
    /// the default no-op is fine for clients with no monitor wiring.
    fn enable_monitor(&mut self, _device_id: String) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Category tag surfaced to the router and to CLI listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    Process,
    System,
    InputDevice,
}

impl CaptureTarget {
    pub fn category(&self) -> SourceCategory {
        match self {
            CaptureTarget::SystemDefaultLoopback => SourceCategory::System,
            CaptureTarget::ProcessLoopback(_) => SourceCategory::Process,
            CaptureTarget::DeviceCapture(_) | CaptureTarget::DeviceLoopback(_) => {
                SourceCategory::InputDevice
            }
        }
    }
}

/// Thin identity + lifecycle wrapper over a capture client (§4.C). Adds
/// the stable `SourceId`, a human display name, the category tag, and
/// the pause gate the router flips without reaching into the client.
pub struct InputSource {
    id: SourceId,
    display_name: String,
    category: SourceCategory,
    client: Box<dyn CaptureClient>,
    paused: Arc<AtomicBool>,
}

impl InputSource {
    pub fn new(id: SourceId, display_name: String, target: &CaptureTarget, client: Box<dyn CaptureClient>) -> Self {
        Self {
            id,
            display_name,
            category: target.category(),
            client,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> SourceCategory {
        self.category
    }

    pub fn client_mut(&mut self) -> &mut dyn CaptureClient {
        self.client.as_mut()
    }

    pub fn client(&self) -> &dyn CaptureClient {
        self.client.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
        if paused {
            self.client.pause();
        } else {
            self.client.resume();
        }
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.client.format()
    }
}

/// Builds a stable `SourceId` per §3's naming scheme.
pub mod ids {
    use super::SourceId;

    pub fn process(pid: u32) -> SourceId {
        format!("process:{pid}")
    }

    pub fn system_default() -> SourceId {
        "system:default".to_string()
    }

    pub fn device(hash: &str) -> SourceId {
        format!("device:{hash}")
    }

    pub fn mic(hash: &str) -> SourceId {
        format!("mic:{hash}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClient {
        format: Option<AudioFormat>,
        running: bool,
    }

    impl CaptureClient for FakeClient {
        fn initialize(&mut self, _target: CaptureTarget) -> Result<(), EngineError> {
            self.format = Some(
                AudioFormat::new(2, 48_000, engine_format::SampleLayout::Float32, None).unwrap(),
            );
            Ok(())
        }
        fn start(&mut self) -> Result<(), EngineError> {
            self.running = true;
            Ok(())
        }
        fn stop(&mut self) -> Result<(), EngineError> {
            self.running = false;
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

    #[test]
    fn test_category_derived_from_target() {
        assert_eq!(
            CaptureTarget::ProcessLoopback(123).category(),
            SourceCategory::Process
        );
        assert_eq!(
            CaptureTarget::SystemDefaultLoopback.category(),
            SourceCategory::System
        );
        assert_eq!(
            CaptureTarget::DeviceCapture("abc".into()).category(),
            SourceCategory::InputDevice
        );
    }

    #[test]
    fn test_input_source_pause_gate_delegates_to_client() {
        let target = CaptureTarget::SystemDefaultLoopback;
        let client = Box::new(FakeClient {
            format: None,
            running: false,
        });
        let mut source = InputSource::new(ids::system_default(), "System".into(), &target, client);
        assert!(!source.is_paused());
        source.set_paused(true);
        assert!(source.is_paused());
    }

    #[test]
    fn test_source_id_helpers() {
        assert_eq!(ids::process(42), "process:42");
        assert_eq!(ids::system_default(), "system:default");
    }
}
