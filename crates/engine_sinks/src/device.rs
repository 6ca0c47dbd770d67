//! Device sink: live monitor playback (§4.E).
//!
//! Grounded in `gecko_core::stream::AudioStream`'s output-callback wiring
//! (cpal output stream fed by an `rtrb` ring buffer) and in the original
//! `DeviceOutputDestination`'s prefill/drop-excess/volume contract.

use crate::error::SinkError;
use crate::sink::{AudioSink, DestinationConfig, SilenceGate};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use engine_format::AudioFormat;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Target render buffer size: roughly 100 ms, per §4.E.
const TARGET_BUFFER_MS: u32 = 100;

fn bytes_for_ms(format: &AudioFormat, ms: u32) -> usize {
    let frames = (format.sample_rate() as u64 * ms as u64 / 1000) as usize;
    frames * format.block_size()
}

pub struct DeviceSink {
    producer: Option<rtrb::Producer<u8>>,
    stream: Option<cpal::Stream>,
    volume_bits: Arc<AtomicU32>,
    open: Arc<AtomicBool>,
    format: Option<AudioFormat>,
    paused: bool,
    last_error: Option<SinkError>,
    silence_gate: Option<SilenceGate>,
}

impl Default for DeviceSink {
    fn default() -> Self {
        Self {
            producer: None,
            stream: None,
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            open: Arc::new(AtomicBool::new(false)),
            format: None,
            paused: false,
            last_error: None,
            silence_gate: None,
        }
    }
}

impl DeviceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }
}

impl AudioSink for DeviceSink {
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError> {
        let capacity = bytes_for_ms(&format, TARGET_BUFFER_MS);
        let (mut producer, consumer) = rtrb::RingBuffer::<u8>::new(capacity.max(64));

        // Pre-fill half the buffer with silence before starting playback
        // to reduce underrun risk while keeping latency bounded.
        let prefill = capacity / 2;
        if let Ok(mut chunk) = producer.write_chunk_uninit(prefill) {
            let (a, b) = chunk.as_mut_slices();
            for slot in a.iter_mut().chain(b.iter_mut()) {
                slot.write(0u8);
            }
            unsafe { chunk.commit_all() };
        }

        self.open.store(true, Ordering::Release);
        self.volume_bits
            .store(config.volume_multiplier.to_bits(), Ordering::Relaxed);

        let volume_bits = Arc::clone(&self.volume_bits);
        let open = Arc::clone(&self.open);

        // Device activation is serialized process-wide (§9): it shares a
        // lock with `engine_platform`'s capture-side activation so the two
        // never race the same OS audio stack concurrently.
        let activation = engine_format::with_activation_lock(engine_format::DEFAULT_ACTIVATION_TIMEOUT, move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| SinkError::ConfigRejected {
                    reason: "no default output device".into(),
                })?;

            let stream_config = cpal::StreamConfig {
                channels: format.channels() as u16,
                sample_rate: cpal::SampleRate(format.sample_rate()),
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let volume = f32::from_bits(volume_bits.load(Ordering::Relaxed));
                        if !open.load(Ordering::Acquire) {
                            data.fill(0.0);
                            return;
                        }
                        let wanted_bytes = data.len() * 4;
                        let available = consumer.slots().min(wanted_bytes);
                        let mut produced = 0;
                        if let Ok(chunk) = consumer.read_chunk(available) {
                            let (a, b) = chunk.as_slices();
                            let bytes: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
                            produced = bytes.len() / 4;
                            for i in 0..produced {
                                let start = i * 4;
                                let raw = f32::from_le_bytes([
                                    bytes[start],
                                    bytes[start + 1],
                                    bytes[start + 2],
                                    bytes[start + 3],
                                ]);
                                data[i] = (raw * volume).clamp(-1.0, 1.0);
                            }
                            chunk.commit_all();
                        }
                        // Underrun: whatever wasn't filled stays silent.
                        // Excess requests beyond what's queued are never
                        // blocked on.
                        for sample in data.iter_mut().skip(produced) {
                            *sample = 0.0;
                        }
                    },
                    move |err| {
                        tracing::error!(%err, "device sink output stream error");
                    },
                    None,
                )
                .map_err(|e| SinkError::ConfigRejected {
                    reason: e.to_string(),
                })?;

            stream.play().map_err(|e| SinkError::ConfigRejected {
                reason: e.to_string(),
            })?;

            Ok::<_, SinkError>(stream)
        });

        let stream = match activation {
            Ok(result) => result?,
            Err(timeout) => {
                return Err(SinkError::ConfigRejected {
                    reason: format!("activation lock timed out after {timeout:?}"),
                })
            }
        };

        self.producer = Some(producer);
        self.stream = Some(stream);
        self.silence_gate = config
            .skip_silence
            .then(|| SilenceGate::new(config.silence_holdoff_ms, format.sample_rate()));
        self.format = Some(format);
        Ok(())
    }

    fn submit(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.paused {
            return Ok(());
        }
        if let (Some(gate), Some(format)) = (self.silence_gate.as_mut(), self.format.as_ref()) {
            let is_silent = engine_format::is_silent(frame, format, 0.01).unwrap_or(false);
            let frame_samples = (frame.len() / format.block_size()) as u64;
            if gate.observe(is_silent, frame_samples) {
                return Ok(());
            }
        }
        let producer = self
            .producer
            .as_mut()
            .ok_or_else(|| SinkError::Internal("submit before configure".into()))?;

        // Query available frames, write min(available, requested), and
        // drop any excess: never block a live-monitor submit.
        let available = producer.slots().min(frame.len());
        if available == 0 {
            return Ok(());
        }
        if let Ok(mut chunk) = producer.write_chunk_uninit(available) {
            let (a, b) = chunk.as_mut_slices();
            let mut offset = 0;
            for slot in a.iter_mut() {
                slot.write(frame[offset]);
                offset += 1;
            }
            for slot in b.iter_mut() {
                slot.write(frame[offset]);
                offset += 1;
            }
            unsafe { chunk.commit_all() };
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.open.store(false, Ordering::Release);
        self.stream.take();
        self.producer.take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.as_ref().map(|e| e.to_string())
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
