//! Sample-rate, channel, and layout conversion.
//!
//! Grounded in the original mixer's `ResampleAudio`: linear interpolation
//! with `ratio = dstRate / srcRate`, per-channel interpolation between the
//! floor/ceil source frames, and the same channel-mapping rule (duplicate
//! the last source channel when the destination has more channels, drop
//! extras when the destination has fewer).

use crate::error::FormatError;
use crate::format::AudioFormat;
use crate::pcm::{frame_count, read_sample, write_sample};

/// Convert `src` (in `src_format`) into `scratch`, writing a PCM stream in
/// `dst_format`. Returns the number of destination frames written, which
/// is always `floor(srcFrames * dstRate / srcRate)`.
///
/// `scratch` is resized to fit the result; callers that need zero
/// allocation on a real-time path should pre-reserve it.
pub fn convert(
    src: &[u8],
    src_format: &AudioFormat,
    dst_format: &AudioFormat,
    scratch: &mut Vec<u8>,
) -> Result<usize, FormatError> {
    let src_frames = frame_count(src.len(), src_format)?;
    let src_channels = src_format.channels() as usize;
    let dst_channels = dst_format.channels() as usize;
    let src_layout = src_format.layout();
    let dst_layout = dst_format.layout();
    let src_sample_size = src_layout.bytes_per_sample();
    let dst_sample_size = dst_layout.bytes_per_sample();

    let ratio = dst_format.sample_rate() as f64 / src_format.sample_rate() as f64;
    let dst_frames = (src_frames as f64 * ratio).floor() as usize;

    scratch.clear();
    scratch.resize(dst_frames * dst_format.block_size(), 0u8);

    if src_frames == 0 || dst_frames == 0 {
        return Ok(dst_frames);
    }

    let src_frame_stride = src_channels * src_sample_size;
    let dst_frame_stride = dst_channels * dst_sample_size;

    for t in 0..dst_frames {
        // Position in source-frame units for this destination frame.
        let source_pos = t as f64 / ratio;
        let floor_idx = source_pos.floor() as usize;
        let ceil_idx = (floor_idx + 1).min(src_frames - 1);
        let floor_idx = floor_idx.min(src_frames - 1);
        let frac = source_pos - floor_idx as f64;

        let dst_frame_off = t * dst_frame_stride;

        for ch in 0..dst_channels {
            // Duplicate the last source channel when dst has more
            // channels than src; drop extras when src has more.
            let src_ch = if ch < src_channels { ch } else { src_channels - 1 };

            let floor_off = floor_idx * src_frame_stride + src_ch * src_sample_size;
            let ceil_off = ceil_idx * src_frame_stride + src_ch * src_sample_size;

            let a = read_sample(&src[floor_off..floor_off + src_sample_size], src_layout);
            let b = read_sample(&src[ceil_off..ceil_off + src_sample_size], src_layout);
            let interpolated = a + (b - a) * frac;

            let dst_off = dst_frame_off + ch * dst_sample_size;
            write_sample(
                &mut scratch[dst_off..dst_off + dst_sample_size],
                dst_layout,
                interpolated,
            );
        }
    }

    Ok(dst_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleLayout;

    fn stereo_float(rate: u32) -> AudioFormat {
        AudioFormat::new(2, rate, SampleLayout::Float32, None).unwrap()
    }

    fn mono_float(rate: u32) -> AudioFormat {
        AudioFormat::new(1, rate, SampleLayout::Float32, None).unwrap()
    }

    #[test]
    fn test_identity_rate_passes_through_within_epsilon() {
        let format = stereo_float(48_000);
        let mut src = Vec::new();
        for i in 0..10 {
            src.extend_from_slice(&(i as f32 * 0.01).to_le_bytes());
            src.extend_from_slice(&(-(i as f32) * 0.01).to_le_bytes());
        }
        let mut scratch = Vec::new();
        let frames = convert(&src, &format, &format, &mut scratch).unwrap();
        assert_eq!(frames, 10);
        assert_eq!(scratch, src);
    }

    #[test]
    fn test_resample_frame_count() {
        // 44100 -> 48000 over 1.0s: floor(44100 * 48000/44100) = 48000
        let src_format = stereo_float(44_100);
        let dst_format = stereo_float(48_000);
        let src = vec![0u8; 44_100 * src_format.block_size()];
        let mut scratch = Vec::new();
        let frames = convert(&src, &src_format, &dst_format, &mut scratch).unwrap();
        assert_eq!(frames, 48_000);
    }

    #[test]
    fn test_channel_mapping_duplicates_last_channel() {
        let src_format = mono_float(48_000);
        let dst_format = stereo_float(48_000);
        let mut src = Vec::new();
        src.extend_from_slice(&0.5f32.to_le_bytes());
        let mut scratch = Vec::new();
        let frames = convert(&src, &src_format, &dst_format, &mut scratch).unwrap();
        assert_eq!(frames, 1);
        let left = f32::from_le_bytes(scratch[0..4].try_into().unwrap());
        let right = f32::from_le_bytes(scratch[4..8].try_into().unwrap());
        assert_eq!(left, 0.5);
        assert_eq!(right, 0.5);
    }

    #[test]
    fn test_channel_mapping_drops_extra_channels() {
        let src_format = stereo_float(48_000);
        let dst_format = mono_float(48_000);
        let mut src = Vec::new();
        src.extend_from_slice(&0.25f32.to_le_bytes());
        src.extend_from_slice(&0.75f32.to_le_bytes());
        let mut scratch = Vec::new();
        let frames = convert(&src, &src_format, &dst_format, &mut scratch).unwrap();
        assert_eq!(frames, 1);
        let mono = f32::from_le_bytes(scratch[0..4].try_into().unwrap());
        assert_eq!(mono, 0.25);
    }
}
