//! Session configuration and the `Command`/`Event` thread-communication
//! types (§3, §3.amb, §6's config surface).
//!
//! `Command` flows caller -> session; `Event` flows session -> caller,
//! the same caller/audio-thread split `gecko_core::message` uses for its
//! own UI-thread boundary, restated for this engine's sources/
//! destinations instead of EQ bands.

use serde::{Deserialize, Serialize};

use crate::capture::CaptureTarget;
use engine_sinks::DestinationConfig;

pub type SourceId = String;
pub type DestinationId = String;
pub type SessionId = u64;

/// One routing rule: `source` is `None` for the wildcard that matches
/// every source (§3: "An empty sourceId matches every source").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub source: Option<SourceId>,
    pub destination: DestinationId,
    pub volume_multiplier: f32,
    pub skip_silence: bool,
}

impl RoutingRule {
    pub fn matches(&self, source_id: &str) -> bool {
        match &self.source {
            None => true,
            Some(id) => id == source_id,
        }
    }
}

/// The kind of sink a `DestinationSpec` should open; selects which
/// `engine_sinks` constructor the router calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Wav,
    Mp3,
    Opus,
    Flac,
    Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationSpec {
    pub id: DestinationId,
    pub kind: DestinationKind,
    pub config: DestinationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: SourceId,
    pub target: CaptureTarget,
    /// Initial gain applied at the capture client, not a routing-rule
    /// volume; see §4.B `setGain`.
    #[serde(default = "default_gain")]
    pub gain: f32,
}

fn default_gain() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedOutputConfig {
    pub enabled: bool,
    pub destination: Option<DestinationId>,
    pub driver_source_id: Option<SourceId>,
}

impl Default for MixedOutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: None,
            driver_source_id: None,
        }
    }
}

/// A complete session configuration, loadable from JSON by the CLI driver
/// (§6.amb).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub sources: Vec<SourceSpec>,
    pub destinations: Vec<DestinationSpec>,
    pub rules: Vec<RoutingRule>,
    #[serde(default)]
    pub mixed: MixedOutputConfig,
}

/// Commands sent to a running session.
#[derive(Debug, Clone)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    AddSource(SourceSpec),
    RemoveSource(SourceId),
    AddDestination(DestinationSpec),
    RemoveDestination(DestinationId),
    AddRoutingRule(RoutingRule),
}

/// Events emitted by a running session, tagged the way
/// `gecko_core::message::Event` is (§3.amb).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    Started { session: SessionId },
    Stopped { session: SessionId },
    Error { message: String },
    SourceStreamFault { source: SourceId, cause: String },
    SinkRemoved { destination: DestinationId, cause: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_rule_wildcard_matches_any_source() {
        let rule = RoutingRule {
            source: None,
            destination: "out".into(),
            volume_multiplier: 1.0,
            skip_silence: false,
        };
        assert!(rule.matches("process:123"));
        assert!(rule.matches("system:default"));
    }

    #[test]
    fn test_routing_rule_specific_source_only_matches_itself() {
        let rule = RoutingRule {
            source: Some("process:123".into()),
            destination: "out".into(),
            volume_multiplier: 1.0,
            skip_silence: false,
        };
        assert!(rule.matches("process:123"));
        assert!(!rule.matches("process:456"));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::SourceStreamFault {
            source: "process:123".into(),
            cause: "device unplugged".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("SourceStreamFault"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Event::SourceStreamFault { .. }));
    }

    #[test]
    fn test_capture_config_round_trip() {
        let config = CaptureConfig {
            sources: vec![SourceSpec {
                id: "system:default".into(),
                target: CaptureTarget::SystemDefaultLoopback,
                gain: 1.0,
            }],
            destinations: vec![DestinationSpec {
                id: "out.wav".into(),
                kind: DestinationKind::Wav,
                config: DestinationConfig::default(),
            }],
            rules: vec![],
            mixed: MixedOutputConfig::default(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CaptureConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sources.len(), 1);
    }
}
