//! Mixer (§4.G): per-source buffers, aligned pull, clipped summation.
//!
//! Grounded in the original `AudioMixer`'s `AddSamples`/`MixSamples`/
//! `GetMixedAudio` trio, restated over `engine_format::convert`/`mix_sum`
//! instead of the original's inline resample-and-sum loop. Driver
//! discipline (which source's submission triggers a pull) is the
//! router's job, not the mixer's — the mixer only ever computes what it
//! is asked to pull.

use std::collections::{HashMap, VecDeque};

use engine_format::AudioFormat;

use crate::error::EngineError;
use crate::message::SourceId;

/// One second worth of target-format bytes: the compaction threshold
/// (§3: "MixerBuffer... when readCursor > 1 second worth of bytes, the
/// prefix is compacted").
fn one_second_bytes(format: &AudioFormat) -> usize {
    format.sample_rate() as usize * format.block_size()
}

struct MixerBuffer {
    format: AudioFormat,
    data: VecDeque<u8>,
    scratch: Vec<u8>,
}

impl MixerBuffer {
    fn new(format: AudioFormat) -> Self {
        Self {
            format,
            data: VecDeque::new(),
            scratch: Vec::new(),
        }
    }

    fn append(&mut self, frame: &[u8], target: &AudioFormat, src_format: &AudioFormat) -> Result<(), EngineError> {
        if src_format == target {
            self.data.extend(frame.iter().copied());
        } else {
            let produced = engine_format::convert(frame, src_format, target, &mut self.scratch)?;
            let bytes = produced * target.block_size();
            self.data.extend(self.scratch[..bytes].iter().copied());
        }
        Ok(())
    }

    fn available_frames(&self, target: &AudioFormat) -> usize {
        self.data.len() / target.block_size()
    }
}

pub struct Mixer {
    target: AudioFormat,
    buffers: HashMap<SourceId, MixerBuffer>,
}

impl Mixer {
    pub fn new(target: AudioFormat) -> Self {
        Self {
            target,
            buffers: HashMap::new(),
        }
    }

    pub fn target_format(&self) -> AudioFormat {
        self.target
    }

    /// Admission: allocates a buffer for `source_id` on first submission
    /// (§4.G "Admission").
    pub fn add(&mut self, source_id: &str, frame: &[u8], src_format: AudioFormat) -> Result<(), EngineError> {
        let target = self.target;
        let buffer = self
            .buffers
            .entry(source_id.to_string())
            .or_insert_with(|| MixerBuffer::new(src_format));
        buffer.append(frame, &target, &src_format)
    }

    /// Permitted at any time; future pulls compute minimums over the
    /// remaining sources (§4.G "Removal").
    pub fn remove_source(&mut self, source_id: &str) {
        self.buffers.remove(source_id);
    }

    pub fn source_count(&self) -> usize {
        self.buffers.len()
    }

    /// Produces the largest whole number of aligned target frames every
    /// registered source can currently supply. Returns the number of
    /// frames written into `out` (0 if any source is empty or there are
    /// no sources at all).
    pub fn pull_mixed(&mut self, out: &mut Vec<u8>) -> Result<usize, EngineError> {
        out.clear();
        if self.buffers.is_empty() {
            return Ok(0);
        }

        let block_size = self.target.block_size();
        let min_frames = self
            .buffers
            .values()
            .map(|b| b.available_frames(&self.target))
            .min()
            .unwrap_or(0);
        if min_frames == 0 {
            return Ok(0);
        }

        let bytes = min_frames * block_size;
        out.resize(bytes, 0);

        for buffer in self.buffers.values_mut() {
            let contiguous: Vec<u8> = buffer.data.iter().take(bytes).copied().collect();
            engine_format::mix_sum(out, &contiguous, &self.target)?;
        }

        // Alignment law: every buffer's read cursor advances by exactly
        // the same N * blockSize, regardless of how much more it holds.
        for buffer in self.buffers.values_mut() {
            buffer.data.drain(..bytes);
        }

        let _ = one_second_bytes(&self.target); // compaction is implicit: VecDeque::drain above already compacts every pull

        Ok(min_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_format::SampleLayout;

    fn fmt() -> AudioFormat {
        AudioFormat::new(1, 48_000, SampleLayout::Int16, None).unwrap()
    }

    fn frame_i16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_pull_with_no_sources_returns_zero() {
        let mut mixer = Mixer::new(fmt());
        let mut out = Vec::new();
        assert_eq!(mixer.pull_mixed(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_pull_blocks_on_shortest_source() {
        let mut mixer = Mixer::new(fmt());
        mixer.add("a", &frame_i16(&[100, 200, 300]), fmt()).unwrap();
        mixer.add("b", &frame_i16(&[1, 2]), fmt()).unwrap();
        let mut out = Vec::new();
        // "b" only supplied 2 frames, so pull produces 2, not 3.
        let frames = mixer.pull_mixed(&mut out).unwrap();
        assert_eq!(frames, 2);
        assert_eq!(out.len(), 2 * fmt().block_size());
    }

    #[test]
    fn test_summation_clips() {
        let mut mixer = Mixer::new(fmt());
        mixer.add("a", &frame_i16(&[30_000]), fmt()).unwrap();
        mixer.add("b", &frame_i16(&[30_000]), fmt()).unwrap();
        let mut out = Vec::new();
        let frames = mixer.pull_mixed(&mut out).unwrap();
        assert_eq!(frames, 1);
        let sample = i16::from_le_bytes([out[0], out[1]]);
        assert_eq!(sample, i16::MAX);
    }

    #[test]
    fn test_removal_changes_minimum() {
        let mut mixer = Mixer::new(fmt());
        mixer.add("a", &frame_i16(&[1, 2, 3]), fmt()).unwrap();
        mixer.add("b", &frame_i16(&[9]), fmt()).unwrap();
        mixer.remove_source("b");
        let mut out = Vec::new();
        let frames = mixer.pull_mixed(&mut out).unwrap();
        assert_eq!(frames, 3);
    }

    #[test]
    fn test_alignment_law_advances_all_cursors_equally() {
        let mut mixer = Mixer::new(fmt());
        mixer.add("a", &frame_i16(&[1, 2, 3, 4]), fmt()).unwrap();
        mixer.add("b", &frame_i16(&[9, 9, 9]), fmt()).unwrap();
        let mut out = Vec::new();
        mixer.pull_mixed(&mut out).unwrap();
        // "a" had 4 frames, min was 3 (from "b"); "a" should have exactly
        // one frame left after the pull.
        assert_eq!(mixer.buffers.get("a").unwrap().available_frames(&fmt()), 1);
        assert_eq!(mixer.buffers.get("b").unwrap().available_frames(&fmt()), 0);
    }
}
