//! Opus encoder sink, OGG-encapsulated.
//!
//! Grounded in the original `OpusEncoder`'s manual OGG framing
//! (`InitializeOggStream`/`WriteOggHeaders`/`WriteOggPage`), restated on
//! top of real crates instead of hand-rolled libogg/libopus calls:
//! `magnum_opus` for the encoder (the crate already in use elsewhere in
//! this codebase's corpus for Opus) and `ogg::writing::PacketWriter` for
//! page framing.

use crate::error::SinkError;
use crate::pipeline::AsyncPipeline;
use crate::sink::{timestamped_path, AudioSink, DestinationConfig, SilenceGate};
use engine_format::AudioFormat;
use magnum_opus::{Application, Bitrate, Channels, Encoder};
use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use std::fs::File;
use std::sync::{Arc, Mutex};

/// Fixed internal rate and frame size per §4.D: 20 ms at 48 kHz.
const OPUS_SAMPLE_RATE: u32 = 48_000;
const FRAME_SAMPLES: usize = 960;
/// §6's documented clamp range for Opus bitrate.
const MIN_BITRATE: u32 = 64_000;
const MAX_BITRATE: u32 = 256_000;

fn clamped_bitrate(bps: u32) -> i32 {
    bps.clamp(MIN_BITRATE, MAX_BITRATE) as i32
}

fn target_format(channels: u8) -> AudioFormat {
    AudioFormat::new(
        channels.min(2),
        OPUS_SAMPLE_RATE,
        engine_format::SampleLayout::Float32,
        None,
    )
    .expect("opus target format is always valid")
}

fn opus_head_packet(channels: u8) -> Vec<u8> {
    let mut packet = Vec::with_capacity(19);
    packet.extend_from_slice(b"OpusHead");
    packet.push(1); // version
    packet.push(channels);
    packet.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    packet.extend_from_slice(&OPUS_SAMPLE_RATE.to_le_bytes()); // input rate, informational
    packet.extend_from_slice(&0i16.to_le_bytes()); // output gain
    packet.push(0); // channel mapping family 0
    packet
}

fn opus_tags_packet() -> Vec<u8> {
    let vendor = b"engine_sinks opus encoder";
    let mut packet = Vec::new();
    packet.extend_from_slice(b"OpusTags");
    packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    packet.extend_from_slice(vendor);
    packet.extend_from_slice(&0u32.to_le_bytes()); // no user comments
    packet
}

struct OpusWriterState {
    encoder: Encoder,
    writer: PacketWriter<'static, File>,
    serial: u32,
    granule_pos: u64,
    channels: u8,
    backlog: Vec<f32>,
    headers_written: bool,
}

impl OpusWriterState {
    fn write_headers(&mut self) -> Result<(), SinkError> {
        self.writer
            .write_packet(
                opus_head_packet(self.channels),
                self.serial,
                PacketWriteEndInfo::NormalPacket,
                0,
            )
            .map_err(|e| SinkError::EncoderFailure(e.to_string()))?;
        self.writer
            .write_packet(
                opus_tags_packet(),
                self.serial,
                PacketWriteEndInfo::NormalPacket,
                0,
            )
            .map_err(|e| SinkError::EncoderFailure(e.to_string()))?;
        self.headers_written = true;
        Ok(())
    }

    fn encode_and_write(&mut self, pcm: &[f32], last: bool) -> Result<(), SinkError> {
        let max_size = 4000;
        let mut out = vec![0u8; max_size];
        let len = self
            .encoder
            .encode_float(pcm, &mut out)
            .map_err(|e| SinkError::EncoderFailure(e.to_string()))?;
        out.truncate(len);
        self.granule_pos += (pcm.len() / self.channels as usize) as u64;
        let end_info = if last {
            PacketWriteEndInfo::EndStream
        } else {
            PacketWriteEndInfo::NormalPacket
        };
        self.writer
            .write_packet(out, self.serial, end_info, self.granule_pos)
            .map_err(|e| SinkError::EncoderFailure(e.to_string()))
    }

    fn push(&mut self, samples: Vec<f32>) -> Result<(), SinkError> {
        if !self.headers_written {
            self.write_headers()?;
        }
        self.backlog.extend(samples);
        let frame_len = FRAME_SAMPLES * self.channels as usize;
        while self.backlog.len() >= frame_len {
            let frame: Vec<f32> = self.backlog.drain(..frame_len).collect();
            self.encode_and_write(&frame, false)?;
        }
        Ok(())
    }

    fn finalize(&mut self) {
        if !self.headers_written {
            let _ = self.write_headers();
        }
        if !self.backlog.is_empty() {
            let channels = self.channels as usize;
            let mut tail = std::mem::take(&mut self.backlog);
            // Pad the final partial frame with silence so the encoder
            // always sees a full 20 ms block.
            tail.resize(FRAME_SAMPLES * channels, 0.0);
            let _ = self.encode_and_write(&tail, true);
        }
    }
}

pub struct OpusSink {
    pipeline: Option<AsyncPipeline>,
    source_format: Option<AudioFormat>,
    paused: bool,
    last_error: Arc<Mutex<Option<SinkError>>>,
    silence_gate: Option<SilenceGate>,
}

impl Default for OpusSink {
    fn default() -> Self {
        Self {
            pipeline: None,
            source_format: None,
            paused: false,
            last_error: Arc::new(Mutex::new(None)),
            silence_gate: None,
        }
    }
}

impl OpusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for OpusSink {
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError> {
        if config.output_path.is_empty() {
            return Err(SinkError::ConfigRejected {
                reason: "output_path must not be empty".into(),
            });
        }
        let out_channels = format.channels().min(2);
        let mode = if out_channels == 1 {
            Channels::Mono
        } else {
            Channels::Stereo
        };
        let mut encoder = Encoder::new(OPUS_SAMPLE_RATE, mode, Application::Audio)
            .map_err(|e| SinkError::ConfigRejected {
                reason: e.to_string(),
            })?;
        encoder
            .set_bitrate(Bitrate::Bits(clamped_bitrate(config.bitrate)))
            .map_err(|e| SinkError::ConfigRejected {
                reason: e.to_string(),
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
        let writer: PacketWriter<'static, File> = PacketWriter::new(file);

        let mut state = OpusWriterState {
            encoder,
            writer,
            serial: 1,
            granule_pos: 0,
            channels: out_channels,
            backlog: Vec::new(),
            headers_written: false,
        };

        let last_error = Arc::clone(&self.last_error);
        let src_format = format;
        let dst_format = target_format(out_channels);

        self.pipeline = Some(AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                let mut scratch = Vec::new();
                let samples = if src_format == dst_format {
                    chunk
                } else {
                    match engine_format::convert(&chunk, &src_format, &dst_format, &mut scratch) {
                        Ok(_) => scratch,
                        Err(e) => {
                            *last_error.lock().unwrap() =
                                Some(SinkError::EncoderFailure(e.to_string()));
                            return;
                        }
                    }
                };
                let floats: Vec<f32> = samples
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                if let Err(err) = state.push(floats) {
                    *last_error.lock().unwrap() = Some(err);
                }
            },
            move || {
                state.finalize();
                tracing::debug!(path = %path, "opus sink finalized");
            },
        ));
        self.silence_gate = config
            .skip_silence
            .then(|| SilenceGate::new(config.silence_holdoff_ms, format.sample_rate()));
        self.source_format = Some(format);
        Ok(())
    }

    fn submit(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.paused {
            return Ok(());
        }
        if let (Some(gate), Some(format)) = (self.silence_gate.as_mut(), self.source_format.as_ref()) {
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
