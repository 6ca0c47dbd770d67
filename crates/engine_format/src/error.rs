//! Format model error types

use thiserror::Error;

/// Errors raised by format validation and PCM conversion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid channel count {0}: must be between 1 and 8")]
    InvalidChannels(u8),

    #[error("invalid sample rate {0}: must be between 1 and 192000")]
    InvalidSampleRate(u32),

    #[error("buffer length {len} is not a multiple of block size {block_size}")]
    Misaligned { len: usize, block_size: usize },

    #[error("sample layout {0:?} unsupported for this operation")]
    UnsupportedLayout(crate::format::SampleLayout),
}
