//! WAV encoder sink.
//!
//! Hand-rolled rather than crate-backed: §4.D's split-on-4GiB and
//! cumulative-size behavior is a direct behavioral requirement grounded in
//! the original `WavWriter`'s `MAX_FILE_SIZE`/`SplitToNextFile`/
//! `UpdateWavHeader` trio, which a generic WAV-writing crate has no hook
//! for.

use crate::error::SinkError;
use crate::pipeline::AsyncPipeline;
use crate::sink::{timestamped_path, AudioSink, DestinationConfig, SilenceGate};
use engine_format::{AudioFormat, SampleLayout};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

/// ~3.7 GiB: matches the original's safety margin under the 4 GiB RIFF
/// size field limit.
const MAX_FILE_SIZE: u64 = 4_000_000_000;

fn wav_format_tag(layout: SampleLayout) -> u16 {
    match layout {
        SampleLayout::Float32 => 3, // WAVE_FORMAT_IEEE_FLOAT
        _ => 1,                     // WAVE_FORMAT_PCM
    }
}

fn write_wav_header(file: &mut File, format: &AudioFormat) -> std::io::Result<()> {
    let block_align = format.block_size() as u16;
    let bits_per_sample = (format.layout().bytes_per_sample() * 8) as u16;
    let byte_rate = format.sample_rate() * block_align as u32;

    file.write_all(b"RIFF")?;
    file.write_all(&0u32.to_le_bytes())?; // placeholder RIFF size
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&wav_format_tag(format.layout()).to_le_bytes())?;
    file.write_all(&(format.channels() as u16).to_le_bytes())?;
    file.write_all(&format.sample_rate().to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;
    file.write_all(b"data")?;
    file.write_all(&0u32.to_le_bytes())?; // placeholder data size
    Ok(())
}

/// Rewrite the RIFF and `data` size fields now that `data_size` is known.
fn update_wav_header(file: &mut File, data_size: u64) -> std::io::Result<()> {
    let riff_size = (data_size + 36) as u32;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&riff_size.to_le_bytes())?;
    file.seek(SeekFrom::Start(40))?;
    file.write_all(&(data_size as u32).to_le_bytes())?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

struct WavWriterState {
    file: File,
    base_filename: String,
    part_number: u32,
    part_data_size: u64,
    total_data_size: u64,
}

impl WavWriterState {
    fn open(base_filename: &str, format: &AudioFormat) -> Result<Self, SinkError> {
        let mut file = File::create(base_filename).map_err(|e| SinkError::IoFailure {
            path: base_filename.to_string(),
            os_error: e.to_string(),
        })?;
        write_wav_header(&mut file, format).map_err(|e| SinkError::IoFailure {
            path: base_filename.to_string(),
            os_error: e.to_string(),
        })?;
        Ok(Self {
            file,
            base_filename: base_filename.to_string(),
            part_number: 1,
            part_data_size: 0,
            total_data_size: 0,
        })
    }

    fn part_path(base_filename: &str, part_number: u32) -> String {
        if part_number == 1 {
            return base_filename.to_string();
        }
        match base_filename.rfind('.') {
            Some(dot) => format!(
                "{}_part{}{}",
                &base_filename[..dot],
                part_number,
                &base_filename[dot..]
            ),
            None => format!("{base_filename}_part{part_number}"),
        }
    }

    fn split(&mut self, format: &AudioFormat) -> Result<(), SinkError> {
        update_wav_header(&mut self.file, self.part_data_size).map_err(|e| {
            SinkError::IoFailure {
                path: self.base_filename.clone(),
                os_error: e.to_string(),
            }
        })?;
        self.part_number += 1;
        let path = Self::part_path(&self.base_filename, self.part_number);
        let mut file = File::create(&path).map_err(|e| SinkError::IoFailure {
            path: path.clone(),
            os_error: e.to_string(),
        })?;
        write_wav_header(&mut file, format).map_err(|e| SinkError::IoFailure {
            path,
            os_error: e.to_string(),
        })?;
        self.file = file;
        self.part_data_size = 0;
        Ok(())
    }

    fn write(&mut self, data: &[u8], format: &AudioFormat) -> Result<(), SinkError> {
        if self.part_data_size + data.len() as u64 > MAX_FILE_SIZE {
            self.split(format)?;
        }
        self.file.write_all(data).map_err(|e| SinkError::IoFailure {
            path: self.base_filename.clone(),
            os_error: e.to_string(),
        })?;
        self.part_data_size += data.len() as u64;
        self.total_data_size += data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) {
        let _ = update_wav_header(&mut self.file, self.part_data_size);
    }
}

pub struct WavSink {
    pipeline: Option<AsyncPipeline>,
    format: Option<AudioFormat>,
    paused: bool,
    last_error: Arc<Mutex<Option<SinkError>>>,
    /// Cumulative bytes written across all parts, kept outside the writer
    /// thread for `total_bytes_written`-style status queries.
    total_bytes: Arc<Mutex<u64>>,
    silence_gate: Option<SilenceGate>,
}

impl Default for WavSink {
    fn default() -> Self {
        Self {
            pipeline: None,
            format: None,
            paused: false,
            last_error: Arc::new(Mutex::new(None)),
            total_bytes: Arc::new(Mutex::new(0)),
            silence_gate: None,
        }
    }
}

impl WavSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_bytes_written(&self) -> u64 {
        *self.total_bytes.lock().unwrap()
    }
}

impl AudioSink for WavSink {
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError> {
        if config.output_path.is_empty() {
            return Err(SinkError::ConfigRejected {
                reason: "output_path must not be empty".into(),
            });
        }
        if format.channels() > 8 || format.sample_rate() > 192_000 {
            return Err(SinkError::ConfigRejected {
                reason: "format exceeds supported channel/rate bounds".into(),
            });
        }

        let path = if config.add_timestamp {
            timestamped_path(&config.output_path, chrono::Local::now())
        } else {
            config.output_path.clone()
        };

        let mut state = WavWriterState::open(&path, &format)?;
        let last_error = Arc::clone(&self.last_error);
        let total_bytes = Arc::clone(&self.total_bytes);
        let writer_format = format;

        self.pipeline = Some(AsyncPipeline::start(
            move |chunk: Vec<u8>| {
                if let Err(err) = state.write(&chunk, &writer_format) {
                    *last_error.lock().unwrap() = Some(err);
                }
                *total_bytes.lock().unwrap() = state.total_data_size;
            },
            move || {
                state.finalize();
                tracing::debug!(path = %state.base_filename, bytes = state.total_data_size, "wav sink finalized");
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

#[cfg(test)]
mod tests {
    use super::*;
    use engine_format::SampleLayout;

    fn float_stereo() -> AudioFormat {
        AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap()
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = float_stereo();

        let mut sink = WavSink::new();
        sink.configure(
            format,
            DestinationConfig {
                output_path: path.to_string_lossy().to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        let frame_bytes = vec![0u8; format.block_size() * 100];
        for _ in 0..10 {
            sink.submit(&frame_bytes).unwrap();
        }
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size as usize, frame_bytes.len() * 10);
        assert_eq!(bytes.len(), 44 + frame_bytes.len() * 10);
    }

    #[test]
    fn test_skip_silence_drops_frames_past_holdoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.wav");
        let format = float_stereo();

        let mut sink = WavSink::new();
        sink.configure(
            format,
            DestinationConfig {
                output_path: path.to_string_lossy().to_string(),
                skip_silence: true,
                silence_holdoff_ms: 2,
                ..Default::default()
            },
        )
        .unwrap();

        // 100 silent frames per submit at 48 kHz: the first submit stays
        // under the ~96-sample holdoff and is written, every later one
        // is past it and dropped.
        let frame_bytes = vec![0u8; format.block_size() * 100];
        for _ in 0..5 {
            sink.submit(&frame_bytes).unwrap();
        }
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size as usize, frame_bytes.len());
    }

    #[test]
    fn test_rejects_empty_path() {
        let mut sink = WavSink::new();
        let result = sink.configure(float_stereo(), DestinationConfig::default());
        assert!(result.is_err());
    }
}
