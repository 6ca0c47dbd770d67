//! MP3 encoder sink.
//!
//! Grounded in `mp3lame-encoder`'s `Builder`/`set_num_channels`/
//! `set_sample_rate`/`set_brate`/`set_quality`/`.encode`/
//! `.flush::<FlushNoGap>` pattern (the same crate and call sequence used
//! for embedded MP3 encoding elsewhere in this codebase's corpus).

use crate::error::SinkError;
use crate::pipeline::AsyncPipeline;
use crate::sink::{timestamped_path, AudioSink, DestinationConfig, SilenceGate};
use engine_format::{AudioFormat, SampleLayout};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// MPEG-1 Layer 3 frame size: samples per channel per encoded frame.
const SAMPLES_PER_FRAME: usize = 1152;

fn nearest_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=40 => Bitrate::Kbps32,
        41..=72 => Bitrate::Kbps64,
        73..=104 => Bitrate::Kbps96,
        105..=144 => Bitrate::Kbps128,
        145..=176 => Bitrate::Kbps160,
        177..=216 => Bitrate::Kbps192,
        217..=272 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// Read interleaved samples in `format`'s layout as i16, the PCM shape
/// `mp3lame-encoder` expects. Not exposed by `engine_format` (its PCM
/// helpers operate byte-for-byte in place); duplicated here rather than
/// widening that crate's public surface for one caller.
fn frame_to_i16(frame: &[u8], format: &AudioFormat) -> Vec<i16> {
    let sample_size = format.layout().bytes_per_sample();
    let mut out = Vec::with_capacity(frame.len() / sample_size);
    let mut offset = 0;
    while offset + sample_size <= frame.len() {
        let v = match format.layout() {
            SampleLayout::Int16 => i16::from_le_bytes([frame[offset], frame[offset + 1]]),
            SampleLayout::Int24Packed => {
                let raw = i32::from_le_bytes([frame[offset], frame[offset + 1], frame[offset + 2], 0]);
                let signed = (raw << 8) >> 8;
                (signed >> 8) as i16
            }
            SampleLayout::Int32 => {
                let raw = i32::from_le_bytes([
                    frame[offset],
                    frame[offset + 1],
                    frame[offset + 2],
                    frame[offset + 3],
                ]);
                (raw >> 16) as i16
            }
            SampleLayout::Float32 => {
                let f = f32::from_le_bytes([
                    frame[offset],
                    frame[offset + 1],
                    frame[offset + 2],
                    frame[offset + 3],
                ]);
                (f.clamp(-1.0, 1.0) * 32_767.0).round() as i16
            }
        };
        out.push(v);
        offset += sample_size;
    }
    out
}

struct Mp3WriterState {
    encoder: mp3lame_encoder::Encoder,
    file: File,
    channels: u8,
    /// Samples (not frames) accumulated per channel since the last
    /// 1152-sample frame boundary was crossed.
    backlog: Vec<i16>,
}

impl Mp3WriterState {
    fn encode_and_write(&mut self, interleaved: &[i16]) -> Result<(), SinkError> {
        let mut out = Vec::with_capacity(interleaved.len());
        let written = if self.channels == 1 {
            self.encoder
                .encode(MonoPcm(interleaved), out.spare_capacity_mut())
                .map_err(|e| SinkError::EncoderFailure(format!("{e:?}")))?
        } else {
            self.encoder
                .encode(InterleavedPcm(interleaved), out.spare_capacity_mut())
                .map_err(|e| SinkError::EncoderFailure(format!("{e:?}")))?
        };
        unsafe { out.set_len(written) };
        self.file.write_all(&out).map_err(|e| SinkError::IoFailure {
            path: "<mp3>".into(),
            os_error: e.to_string(),
        })
    }

    fn push(&mut self, samples: Vec<i16>) -> Result<(), SinkError> {
        self.backlog.extend(samples);
        let frame_len = SAMPLES_PER_FRAME * self.channels as usize;
        while self.backlog.len() >= frame_len {
            let frame: Vec<i16> = self.backlog.drain(..frame_len).collect();
            self.encode_and_write(&frame)?;
        }
        Ok(())
    }

    fn finalize(&mut self) {
        if !self.backlog.is_empty() {
            let tail = std::mem::take(&mut self.backlog);
            let _ = self.encode_and_write(&tail);
        }
        let mut out = Vec::with_capacity(7200);
        if let Ok(written) = self
            .encoder
            .flush::<FlushNoGap>(out.spare_capacity_mut())
        {
            unsafe { out.set_len(written) };
            let _ = self.file.write_all(&out);
        }
    }
}

pub struct Mp3Sink {
    pipeline: Option<AsyncPipeline>,
    format: Option<AudioFormat>,
    paused: bool,
    last_error: Arc<Mutex<Option<SinkError>>>,
    silence_gate: Option<SilenceGate>,
}

impl Default for Mp3Sink {
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

impl Mp3Sink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for Mp3Sink {
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError> {
        if config.output_path.is_empty() {
            return Err(SinkError::ConfigRejected {
                reason: "output_path must not be empty".into(),
            });
        }
        if format.channels() > 2 {
            return Err(SinkError::ConfigRejected {
                reason: "mp3 sink supports at most 2 channels".into(),
            });
        }
        let mut builder = Builder::new().ok_or_else(|| {
            SinkError::ConfigRejected {
                reason: "failed to allocate lame encoder".into(),
            }
        })?;
        builder
            .set_num_channels(format.channels())
            .map_err(|e| SinkError::ConfigRejected {
                reason: format!("{e:?}"),
            })?;
        builder
            .set_sample_rate(format.sample_rate())
            .map_err(|e| SinkError::ConfigRejected {
                reason: format!("{e:?}"),
            })?;
        builder
            .set_brate(nearest_bitrate(config.bitrate / 1000))
            .map_err(|e| SinkError::ConfigRejected {
                reason: format!("{e:?}"),
            })?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| SinkError::ConfigRejected {
                reason: format!("{e:?}"),
            })?;
        let encoder = builder.build().map_err(|e| SinkError::ConfigRejected {
            reason: format!("{e:?}"),
        })?;

        let path = if config.add_timestamp {
            timestamped_path(&config.output_path, chrono::Local::now())
        } else {
            config.output_path.clone()
        };
        let file = File::create(&path).map_err(|e| SinkError::IoFailure {
            path: path.clone(),
            os_error: e.to_string(),
        })?;

        let mut state = Mp3WriterState {
            encoder,
            file,
            channels: format.channels(),
            backlog: Vec::new(),
        };
        let last_error = Arc::clone(&self.last_error);
        let writer_format = format;

        self.pipeline = Some(AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                let samples = frame_to_i16(&chunk, &writer_format);
                if let Err(err) = state.push(samples) {
                    *last_error.lock().unwrap() = Some(err);
                }
            },
            move || {
                state.finalize();
                tracing::debug!(path = %path, "mp3 sink finalized");
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
