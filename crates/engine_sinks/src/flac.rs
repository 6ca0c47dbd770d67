//! FLAC encoder sink.
//!
//! Grounded in the original `FlacEncoder`'s block-oriented
//! `FLAC__StreamEncoder` usage, restated on top of `flacenc` — a
//! pure-Rust encoder chosen because no FLAC crate appears anywhere in
//! this codebase's retrieved corpus; it is the closest ecosystem
//! equivalent to the reference encoder's `process()` call and avoids
//! pulling in a `-sys` binding to the C library.
//!
//! `flacenc`'s public API encodes a complete source in one call rather
//! than accepting block-at-a-time pushes, so this sink accumulates
//! interleaved 24-bit samples in the writer thread (cheap: no encoding
//! work happens until close) and performs the actual `encode_with_
//! fixed_block_size` call, with `block_size = 1024` as specified, during
//! the pipeline's finalize step. This keeps the accumulation itself off
//! the producer callback, satisfying §4.F's non-blocking submit contract,
//! at the cost of deferring the real encode to shutdown.

use crate::error::SinkError;
use crate::pipeline::AsyncPipeline;
use crate::sink::{timestamped_path, AudioSink, DestinationConfig, SilenceGate};
use engine_format::{AudioFormat, SampleLayout};
use flacenc::component::BitRepr;
use flacenc::config;
use flacenc::source::MemSource;
use std::sync::{Arc, Mutex};

/// Fixed per §4.D: FLAC blocks are 1024 frames.
const BLOCK_SIZE: usize = 1024;
/// Internal sample resolution ceiling per §4.D.
const BITS_PER_SAMPLE: usize = 24;

fn sample_to_i24(raw: f64) -> i32 {
    (raw.clamp(-1.0, 1.0) * 8_388_607.0).round() as i32
}

fn frame_to_i32(frame: &[u8], format: &AudioFormat) -> Vec<i32> {
    let sample_size = format.layout().bytes_per_sample();
    let mut out = Vec::with_capacity(frame.len() / sample_size);
    let mut offset = 0;
    while offset + sample_size <= frame.len() {
        let v = match format.layout() {
            SampleLayout::Float32 => {
                let f = f32::from_le_bytes([
                    frame[offset],
                    frame[offset + 1],
                    frame[offset + 2],
                    frame[offset + 3],
                ]);
                sample_to_i24(f as f64)
            }
            SampleLayout::Int16 => {
                let v = i16::from_le_bytes([frame[offset], frame[offset + 1]]);
                (v as i32) << 8
            }
            SampleLayout::Int24Packed => {
                let raw = i32::from_le_bytes([frame[offset], frame[offset + 1], frame[offset + 2], 0]);
                (raw << 8) >> 8
            }
            SampleLayout::Int32 => {
                let raw = i32::from_le_bytes([
                    frame[offset],
                    frame[offset + 1],
                    frame[offset + 2],
                    frame[offset + 3],
                ]);
                raw >> 8
            }
        };
        out.push(v);
        offset += sample_size;
    }
    out
}

struct FlacWriterState {
    path: String,
    channels: usize,
    sample_rate: u32,
    compression_level: usize,
    interleaved: Vec<i32>,
}

impl FlacWriterState {
    fn finalize(&mut self) -> Result<(), SinkError> {
        if self.interleaved.is_empty() {
            return Ok(());
        }
        let source = MemSource::from_samples(
            &self.interleaved,
            self.channels,
            BITS_PER_SAMPLE,
            self.sample_rate as usize,
        );
        let config = config::Encoder::from_compression_level(self.compression_level);
        let stream = flacenc::encode_with_fixed_block_size(&config, source, BLOCK_SIZE)
            .map_err(|e| SinkError::EncoderFailure(format!("{e:?}")))?;

        let mut sink = flacenc::bitsink::ByteSink::new();
        stream
            .write(&mut sink)
            .map_err(|e| SinkError::EncoderFailure(format!("{e:?}")))?;

        std::fs::write(&self.path, sink.as_slice()).map_err(|e| SinkError::IoFailure {
            path: self.path.clone(),
            os_error: e.to_string(),
        })
    }
}

pub struct FlacSink {
    pipeline: Option<AsyncPipeline>,
    format: Option<AudioFormat>,
    paused: bool,
    last_error: Arc<Mutex<Option<SinkError>>>,
    silence_gate: Option<SilenceGate>,
}

impl Default for FlacSink {
    fn default() -> Self {
        Self {
            pipeline: None,
            format: None,
            paused: false,
            last_error: Arc::new(Mutex::new(None)),
            silence_gate: None,
        }
    }
}

impl FlacSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for FlacSink {
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError> {
        if config.output_path.is_empty() {
            return Err(SinkError::ConfigRejected {
                reason: "output_path must not be empty".into(),
            });
        }
        if !(0..=8).contains(&config.compression_level) {
            return Err(SinkError::ConfigRejected {
                reason: "compression_level must be in [0, 8]".into(),
            });
        }

        let path = if config.add_timestamp {
            timestamped_path(&config.output_path, chrono::Local::now())
        } else {
            config.output_path.clone()
        };

        let mut state = FlacWriterState {
            path: path.clone(),
            channels: format.channels() as usize,
            sample_rate: format.sample_rate(),
            compression_level: config.compression_level as usize,
            interleaved: Vec::new(),
        };
        let last_error = Arc::clone(&self.last_error);
        let writer_format = format;

        self.pipeline = Some(AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                state.interleaved.extend(frame_to_i32(&chunk, &writer_format));
            },
            move || {
                if let Err(err) = state.finalize() {
                    *last_error.lock().unwrap() = Some(err);
                }
                tracing::debug!(path = %path, "flac sink finalized");
            },
        ));
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
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| SinkError::Internal("submit before configure".into()))?;
        pipeline.submit(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.close();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pipeline.as_ref().map(|p| p.is_open()).unwrap_or(false)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
