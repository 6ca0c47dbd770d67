//! Audio sink implementations: encoder file sinks, the live-monitor
//! device sink, and the async write pipeline shared by the file-backed
//! ones. No OS audio-capture surface lives here — only consumption.

mod device;
mod error;
mod flac;
mod mp3;
mod opus;
mod pipeline;
mod sink;
mod wav;

pub use device::DeviceSink;
pub use error::SinkError;
pub use flac::FlacSink;
pub use mp3::Mp3Sink;
pub use opus::OpusSink;
pub use pipeline::AsyncPipeline;
pub use sink::{timestamped_path, AudioSink, DestinationConfig, SilenceGate};
pub use wav::WavSink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination_config() {
        let config = DestinationConfig::default();
        assert_eq!(config.bitrate, 192_000);
        assert_eq!(config.compression_level, 5);
        assert!((config.volume_multiplier - 1.0).abs() < f32::EPSILON);
    }
}
