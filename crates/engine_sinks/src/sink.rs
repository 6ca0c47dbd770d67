//! Shared sink contract (§4.D/§4.E) and destination configuration.

use crate::error::SinkError;
use engine_format::AudioFormat;
use serde::{Deserialize, Serialize};

/// Configuration common to every destination kind. Fields not applicable
/// to a given sink kind are simply ignored by that sink's `configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub output_path: String,
    pub add_timestamp: bool,
    pub bitrate: u32,
    pub compression_level: u32,
    pub volume_multiplier: f32,
    pub skip_silence: bool,
    pub silence_holdoff_ms: u32,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            output_path: String::new(),
            add_timestamp: false,
            bitrate: 192_000,
            compression_level: 5,
            volume_multiplier: 1.0,
            skip_silence: false,
            silence_holdoff_ms: 0,
        }
    }
}

/// The contract every destination variant conforms to (§9: "Polymorphic
/// destinations" is restated as a tagged contract, not a base class).
pub trait AudioSink: Send {
    /// Validate `format`/`config`, open the output, and start the writer
    /// task. Fails with `ConfigRejected` on bad inputs, `IoFailure` on
    /// system error.
    fn configure(&mut self, format: AudioFormat, config: DestinationConfig) -> Result<(), SinkError>;

    /// Non-blocking: copies `frame` into an owned chunk, enqueues it, and
    /// signals the writer. Returns `Ok(())` even when the sink is paused
    /// (the frame is dropped, not queued).
    fn submit(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// Idempotent. Drains the queue, finalizes the format's footer, and
    /// releases the underlying resource.
    fn close(&mut self) -> Result<(), SinkError>;

    fn is_open(&self) -> bool;

    /// The most recent asynchronous (writer-thread) error, if any. Owned
    /// rather than borrowed: writer-thread errors are recorded behind a
    /// mutex and a borrow through it cannot outlive the lock guard.
    fn last_error(&self) -> Option<String>;

    fn set_paused(&mut self, paused: bool);
}

/// Insert `_YYYYMMDD_HHMMSS` before the last extension dot (or append it
/// if there is no dot). A pure string function, not a parent-class method
/// (§9: "Inheritance chain for file sinks").
pub fn timestamped_path(path: &str, now: chrono::DateTime<chrono::Local>) -> String {
    let stamp = now.format("_%Y%m%d_%H%M%S").to_string();
    match path.rfind('.') {
        Some(dot) => format!("{}{}{}", &path[..dot], stamp, &path[dot..]),
        None => format!("{path}{stamp}"),
    }
}

/// Tracks consecutive-silence run length for the optional per-sink gate
/// (§4.F). Holdoff is expressed in samples (ms * sample_rate / 1000).
pub struct SilenceGate {
    holdoff_samples: u64,
    run_length: u64,
}

impl SilenceGate {
    pub fn new(holdoff_ms: u32, sample_rate: u32) -> Self {
        Self {
            holdoff_samples: holdoff_ms as u64 * sample_rate as u64 / 1000,
            run_length: 0,
        }
    }

    /// Returns `true` if a silent frame with `frame_samples` samples
    /// should be dropped under the hysteresis rule in §8.
    pub fn observe(&mut self, is_silent: bool, frame_samples: u64) -> bool {
        if !is_silent {
            self.run_length = 0;
            return false;
        }
        let was_over_holdoff = self.run_length >= self.holdoff_samples;
        self.run_length += frame_samples;
        was_over_holdoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_path_with_extension() {
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 5, 13, 30, 0).unwrap();
        assert_eq!(
            timestamped_path("recording.wav", now),
            "recording_20240305_133000.wav"
        );
    }

    #[test]
    fn test_timestamped_path_without_extension() {
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 5, 13, 30, 0).unwrap();
        assert_eq!(timestamped_path("recording", now), "recording_20240305_133000");
    }

    #[test]
    fn test_silence_gate_hysteresis() {
        // threshold/holdoff scenario from §8 scenario 4: holdoff 1000
        // samples, frames of 100 samples each.
        let mut gate = SilenceGate::new(1000 * 1000 / 48_000, 48_000);
        // First ~1000 silent samples pass (not yet over holdoff).
        let mut dropped_count = 0;
        for _ in 0..10 {
            if gate.observe(true, 100) {
                dropped_count += 1;
            }
        }
        assert!(dropped_count > 0, "later frames should be dropped once past holdoff");
        // A non-silent frame resets the counter immediately.
        assert!(!gate.observe(false, 100));
        assert!(!gate.observe(true, 50));
    }
}
