//! Audio format model and PCM utilities
//!
//! This crate has no OS dependencies: it describes sample layouts and
//! converts between them. Everything here must be safe to call from a
//! real-time audio callback (no allocation on the hot conversion path
//! beyond the caller-supplied scratch buffer).

mod activation;
mod error;
mod format;
mod pcm;

pub use activation::{with_activation_lock, DEFAULT_ACTIVATION_TIMEOUT};
pub use error::FormatError;
pub use format::{AudioFormat, SampleLayout};
pub use pcm::{apply_gain, byte_len, frame_count, is_silent, mix_sum, peak_amplitude};

// Conversion lives in its own module because it is the single largest
// piece of PCM math (resample + channel map + layout convert).
mod convert;
pub use convert::convert;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let fmt = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
        assert_eq!(fmt.channels(), 2);
    }
}
