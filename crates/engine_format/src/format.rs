//! AudioFormat value type

use crate::error::FormatError;
use serde::{Deserialize, Serialize};

/// Sample storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleLayout {
    Int16,
    /// 24-bit integer, packed 3 bytes per sample, little-endian.
    Int24Packed,
    Int32,
    Float32,
}

impl SampleLayout {
    /// Bytes occupied by a single sample in this layout.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleLayout::Int16 => 2,
            SampleLayout::Int24Packed => 3,
            SampleLayout::Int32 => 4,
            SampleLayout::Float32 => 4,
        }
    }

    /// Full-scale peak magnitude used for clipping and gain application.
    pub fn full_scale(self) -> f64 {
        match self {
            SampleLayout::Int16 => 32_767.0,
            SampleLayout::Int24Packed => 8_388_607.0,
            SampleLayout::Int32 => 2_147_483_647.0,
            SampleLayout::Float32 => 1.0,
        }
    }
}

/// Immutable description of a PCM stream's shape.
///
/// Two formats are compatible iff every field is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    channels: u8,
    sample_rate: u32,
    layout: SampleLayout,
    /// Optional Windows-style speaker channel mask; carried opaquely, not
    /// interpreted by this crate.
    channel_mask: Option<u32>,
}

impl AudioFormat {
    pub fn new(
        channels: u8,
        sample_rate: u32,
        layout: SampleLayout,
        channel_mask: Option<u32>,
    ) -> Result<Self, FormatError> {
        if channels == 0 || channels > 8 {
            return Err(FormatError::InvalidChannels(channels));
        }
        if sample_rate == 0 || sample_rate > 192_000 {
            return Err(FormatError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            channels,
            sample_rate,
            layout,
            channel_mask,
        })
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    pub fn channel_mask(&self) -> Option<u32> {
        self.channel_mask
    }

    /// Bytes per frame: channels * bytes-per-sample.
    pub fn block_size(&self) -> usize {
        self.channels as usize * self.layout.bytes_per_sample()
    }

    /// Two formats are compatible iff all fields are equal. `PartialEq`
    /// already gives us this; named for call-site clarity against §3.
    pub fn is_compatible_with(&self, other: &AudioFormat) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size() {
        let fmt = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
        assert_eq!(fmt.block_size(), 8);
    }

    #[test]
    fn test_rejects_bad_channels() {
        assert!(AudioFormat::new(0, 48_000, SampleLayout::Int16, None).is_err());
        assert!(AudioFormat::new(9, 48_000, SampleLayout::Int16, None).is_err());
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(AudioFormat::new(2, 0, SampleLayout::Int16, None).is_err());
        assert!(AudioFormat::new(2, 200_000, SampleLayout::Int16, None).is_err());
    }

    #[test]
    fn test_compatibility() {
        let a = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
        let b = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
        let c = AudioFormat::new(2, 44_100, SampleLayout::Float32, None).unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
