//! `cpal`-backed `CaptureClient` (§4.B.amb): `DeviceCapture` and
//! `SystemDefaultLoopback` on every platform `cpal` runs on. Grounded in
//! `gecko_core::stream::AudioStream`'s cpal input-stream wiring, restated
//! against `engine_core::CaptureClient`'s contract instead of a direct
//! ring-buffer-to-DSP pipeline.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use engine_core::{CaptureCallback, CaptureClient, CaptureTarget, EngineError};
use engine_format::{AudioFormat, SampleLayout};

use crate::error::PlatformError;

fn pick_device(host: &cpal::Host, target: &CaptureTarget) -> Result<cpal::Device, PlatformError> {
    match target {
        CaptureTarget::SystemDefaultLoopback | CaptureTarget::DeviceLoopback(_) => host
            .default_output_device()
            .ok_or_else(|| PlatformError::DeviceNotFound("default output (loopback source)".into())),
        CaptureTarget::DeviceCapture(id) => host
            .input_devices()
            .map_err(|e| PlatformError::Internal(e.to_string()))?
            .find(|d| d.name().map(|n| &n == id).unwrap_or(false))
            .ok_or_else(|| PlatformError::DeviceNotFound(id.clone())),
        CaptureTarget::ProcessLoopback(_) => unreachable!("handled by a dedicated client"),
    }
}

pub struct CpalCaptureClient {
    stream: Option<cpal::Stream>,
    format: Option<AudioFormat>,
    gain_bits: Arc<AtomicU32>,
    paused: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<CaptureCallback>>>,
}

impl Default for CpalCaptureClient {
    fn default() -> Self {
        Self {
            stream: None,
            format: None,
            gain_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            paused: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
        }
    }
}

impl CpalCaptureClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureClient for CpalCaptureClient {
    fn initialize(&mut self, target: CaptureTarget) -> Result<(), EngineError> {
        let gain_bits = Arc::clone(&self.gain_bits);
        let paused = Arc::clone(&self.paused);
        let callback = Arc::clone(&self.callback);

        // Device/stream activation is serialized process-wide (§9): two
        // concurrent `Initialize`/`build_input_stream` calls can race the
        // OS audio stack.
        let activation = engine_format::with_activation_lock(engine_format::DEFAULT_ACTIVATION_TIMEOUT, move || {
            let host = cpal::default_host();
            let device = pick_device(&host, &target)?;
            let config = device
                .default_input_config()
                .map_err(|e| PlatformError::StreamBuildFailed(e.to_string()))?;

            let channels = config.channels() as u8;
            let sample_rate = config.sample_rate().0;
            let layout = SampleLayout::Float32;
            let format = AudioFormat::new(channels.max(1), sample_rate, layout, None)
                .map_err(|e| PlatformError::Internal(e.to_string()))?;
            let stream_format = format;

            let stream = device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        if paused.load(Ordering::Acquire) {
                            return;
                        }
                        let gain = f32::from_bits(gain_bits.load(Ordering::Relaxed));
                        let mut bytes: Vec<u8> = Vec::with_capacity(data.len() * 4);
                        for sample in data {
                            let applied = if (gain - 1.0).abs() > 0.01 {
                                (*sample * gain).clamp(-1.0, 1.0)
                            } else {
                                *sample
                            };
                            bytes.extend_from_slice(&applied.to_le_bytes());
                        }
                        if let Some(cb) = callback.lock().unwrap().as_mut() {
                            cb(&bytes);
                        }
                    },
                    move |err| {
                        tracing::error!(%err, "cpal capture stream error");
                    },
                    None,
                )
                .map_err(|e| PlatformError::StreamBuildFailed(e.to_string()))?;

            Ok::<_, PlatformError>((stream, stream_format))
        });

        let (stream, stream_format) = match activation {
            Ok(result) => result?,
            Err(timeout) => {
                return Err(PlatformError::ActivationTimedOut {
                    resource: "cpal input stream".into(),
                    timeout,
                }
                .into())
            }
        };

        self.stream = Some(stream);
        self.format = Some(stream_format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| PlatformError::StreamBuildFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(stream) = &self.stream {
            let _ = stream.pause();
        }
        self.stream = None;
        Ok(())
    }

    fn set_callback(&mut self, callback: CaptureCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_round_trip() {
        let client = CpalCaptureClient::new();
        client.set_gain(0.5);
        assert!((f32::from_bits(client.gain_bits.load(Ordering::Relaxed)) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pause_resume_flags() {
        let mut client = CpalCaptureClient::new();
        client.pause();
        assert!(client.paused.load(Ordering::Acquire));
        client.resume();
        assert!(!client.paused.load(Ordering::Acquire));
    }
}
