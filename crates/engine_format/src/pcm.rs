//! PCM sample-level operations: gain, silence detection, summation.
//!
//! All operations here take pre-validated, frame-aligned byte buffers; the
//! caller guarantees alignment (see §4.A).

use crate::error::FormatError;
use crate::format::{AudioFormat, SampleLayout};

/// Convert a byte length to a frame count for `format`, or an `Internal`
/// alignment violation if `bytes` is not a whole number of frames.
pub fn frame_count(bytes: usize, format: &AudioFormat) -> Result<usize, FormatError> {
    let block = format.block_size();
    if bytes % block != 0 {
        return Err(FormatError::Misaligned {
            len: bytes,
            block_size: block,
        });
    }
    Ok(bytes / block)
}

/// Convert a frame count to a byte length for `format`.
pub fn byte_len(frames: usize, format: &AudioFormat) -> usize {
    frames * format.block_size()
}

#[inline]
pub(crate) fn read_sample(bytes: &[u8], layout: SampleLayout) -> f64 {
    match layout {
        SampleLayout::Int16 => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]);
            v as f64 / layout.full_scale()
        }
        SampleLayout::Int24Packed => {
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            // sign-extend bit 23
            let signed = (raw << 8) >> 8;
            signed as f64 / layout.full_scale()
        }
        SampleLayout::Int32 => {
            let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            v as f64 / layout.full_scale()
        }
        SampleLayout::Float32 => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
        }
    }
}

#[inline]
pub(crate) fn write_sample(bytes: &mut [u8], layout: SampleLayout, normalized: f64) {
    match layout {
        SampleLayout::Int16 => {
            let clipped = normalized.clamp(-1.0, 1.0) * layout.full_scale();
            let v = clipped.round() as i32;
            let v = v.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            bytes[..2].copy_from_slice(&v.to_le_bytes());
        }
        SampleLayout::Int24Packed => {
            let clipped = normalized.clamp(-1.0, 1.0) * layout.full_scale();
            let v = clipped.round() as i32;
            let v = v.clamp(-8_388_608, 8_388_607);
            let le = v.to_le_bytes();
            bytes[0] = le[0];
            bytes[1] = le[1];
            bytes[2] = le[2];
        }
        SampleLayout::Int32 => {
            let clipped = normalized.clamp(-1.0, 1.0) * layout.full_scale();
            let v = clipped.round() as i64;
            let v = v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        SampleLayout::Float32 => {
            let clipped = normalized.clamp(-1.0, 1.0) as f32;
            bytes[..4].copy_from_slice(&clipped.to_le_bytes());
        }
    }
}

/// Multiply every sample in `frame` by `gain`, clipping to the format's
/// range. A no-op when `|gain - 1| < 0.01` (Volume idempotence property).
pub fn apply_gain(frame: &mut [u8], format: &AudioFormat, gain: f32) -> Result<(), FormatError> {
    if (gain - 1.0).abs() < 0.01 {
        return Ok(());
    }
    let layout = format.layout();
    let sample_size = layout.bytes_per_sample();
    frame_count(frame.len(), format)?;

    let mut offset = 0;
    while offset < frame.len() {
        let sample = read_sample(&frame[offset..offset + sample_size], layout);
        write_sample(
            &mut frame[offset..offset + sample_size],
            layout,
            sample * gain as f64,
        );
        offset += sample_size;
    }
    Ok(())
}

/// Peak absolute amplitude across `frame`, normalized to [0, 1].
pub fn peak_amplitude(frame: &[u8], format: &AudioFormat) -> Result<f32, FormatError> {
    let layout = format.layout();
    let sample_size = layout.bytes_per_sample();
    frame_count(frame.len(), format)?;

    let mut peak = 0.0f64;
    let mut offset = 0;
    while offset < frame.len() {
        let sample = read_sample(&frame[offset..offset + sample_size], layout).abs();
        if sample > peak {
            peak = sample;
        }
        offset += sample_size;
    }
    Ok(peak as f32)
}

/// True when the peak normalized amplitude is strictly below `threshold`.
/// Default threshold is 0.01 for floats; callers pass the equivalent
/// scaled value for integer layouts (see §9 open question: the
/// normalized-float semantic is treated as canonical).
pub fn is_silent(frame: &[u8], format: &AudioFormat, threshold: f32) -> Result<bool, FormatError> {
    Ok(peak_amplitude(frame, format)? < threshold)
}

/// Sum `src` into `dst` sample-wise, clipping to the format's range.
/// Only `Int16` and `Float32` are supported, matching the mixer's
/// post-resample summation contract (§4.G) — all mixer buffers carry the
/// target format by the time they reach summation.
pub fn mix_sum(dst: &mut [u8], src: &[u8], format: &AudioFormat) -> Result<(), FormatError> {
    let layout = format.layout();
    if !matches!(layout, SampleLayout::Int16 | SampleLayout::Float32) {
        return Err(FormatError::UnsupportedLayout(layout));
    }
    if dst.len() != src.len() {
        return Err(FormatError::Misaligned {
            len: src.len(),
            block_size: dst.len(),
        });
    }
    let sample_size = layout.bytes_per_sample();
    let mut offset = 0;
    while offset < dst.len() {
        let a = read_sample(&dst[offset..offset + sample_size], layout);
        let b = read_sample(&src[offset..offset + sample_size], layout);
        write_sample(&mut dst[offset..offset + sample_size], layout, a + b);
        offset += sample_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleLayout;

    fn fmt(layout: SampleLayout) -> AudioFormat {
        AudioFormat::new(1, 48_000, layout, None).unwrap()
    }

    #[test]
    fn test_apply_gain_identity() {
        let format = fmt(SampleLayout::Float32);
        let original = 0.5f32.to_le_bytes().to_vec();
        let mut frame = original.clone();
        apply_gain(&mut frame, &format, 1.0).unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_apply_gain_zero() {
        let format = fmt(SampleLayout::Float32);
        let mut frame = 0.5f32.to_le_bytes().to_vec();
        apply_gain(&mut frame, &format, 0.0).unwrap();
        assert_eq!(f32::from_le_bytes(frame.try_into().unwrap()), 0.0);
    }

    #[test]
    fn test_is_silent() {
        let format = fmt(SampleLayout::Float32);
        let quiet = 0.005f32.to_le_bytes().to_vec();
        let loud = 0.5f32.to_le_bytes().to_vec();
        assert!(is_silent(&quiet, &format, 0.01).unwrap());
        assert!(!is_silent(&loud, &format, 0.01).unwrap());
    }

    #[test]
    fn test_mix_sum_clips() {
        let format = fmt(SampleLayout::Float32);
        let mut dst = 0.8f32.to_le_bytes().to_vec();
        let src = 0.8f32.to_le_bytes().to_vec();
        mix_sum(&mut dst, &src, &format).unwrap();
        assert_eq!(f32::from_le_bytes(dst.try_into().unwrap()), 1.0);
    }

    #[test]
    fn test_mix_sum_int16_clips() {
        let format = fmt(SampleLayout::Int16);
        let mut dst = 30_000i16.to_le_bytes().to_vec();
        let src = 30_000i16.to_le_bytes().to_vec();
        mix_sum(&mut dst, &src, &format).unwrap();
        assert_eq!(i16::from_le_bytes(dst.try_into().unwrap()), 32_767);
    }

    #[test]
    fn test_frame_count_rejects_misaligned() {
        let format = fmt(SampleLayout::Float32);
        assert!(frame_count(3, &format).is_err());
        assert_eq!(frame_count(8, &format).unwrap(), 2);
    }
}
