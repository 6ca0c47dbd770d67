//! Session/router (§4.H): the admission and dispatch authority.
//!
//! Grounded in the original `CaptureManager`/`AudioRouter` pairing,
//! restated as a single `Router` owning a map of `Session`s. The
//! deadlock-avoidance shape §4.H documents ("under lock, extract owned
//! handles; drop the lock; then stop/close") is followed literally in
//! `stop_session` and in the `Router::*_all` supplemented operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use engine_format::AudioFormat;
use engine_sinks::{AudioSink, DestinationConfig, DeviceSink, FlacSink, Mp3Sink, OpusSink, WavSink};

use crate::capture::{CaptureCallback, CaptureClient, CaptureTarget, InputSource};
use crate::error::EngineError;
use crate::message::{CaptureConfig, DestinationId, DestinationKind, DestinationSpec, RoutingRule, SourceId};
use crate::mixer::Mixer;

/// Supplied by the caller (`engine_cli`), since the concrete OS-backed
/// `CaptureClient` lives in `engine_platform`, which depends on
/// `engine_core` rather than the other way around.
pub type ClientFactory = dyn Fn(&CaptureTarget) -> Result<Box<dyn CaptureClient>, EngineError> + Send + Sync;

fn build_sink(kind: DestinationKind) -> Box<dyn AudioSink> {
    match kind {
        DestinationKind::Wav => Box::new(WavSink::new()),
        DestinationKind::Mp3 => Box::new(Mp3Sink::new()),
        DestinationKind::Opus => Box::new(OpusSink::new()),
        DestinationKind::Flac => Box::new(FlacSink::new()),
        DestinationKind::Device => Box::new(DeviceSink::new()),
    }
}

/// State touched by the per-frame routing callback, guarded by one
/// short-held mutex (§4.H step 2: "Acquire session lock (short critical
/// section)").
struct RoutingState {
    destinations: HashMap<DestinationId, Box<dyn AudioSink>>,
    /// Each destination's configured format, resolved once at
    /// `start_session` time from the source(s) that actually route to it
    /// (§3). `route_frame` converts into this format per rule whenever a
    /// source's negotiated format doesn't already match it.
    destination_formats: HashMap<DestinationId, AudioFormat>,
    rules: Vec<RoutingRule>,
    mixer: Option<Mixer>,
    mixed_destination: Option<DestinationId>,
    driver_source: Option<SourceId>,
    paused: bool,
    last_error: Option<String>,
}

/// Shared between the session and every source's routing callback
/// closure. `valid` is checked lock-free before the callback does any
/// other work (§4.H step 1).
struct SessionShared {
    valid: AtomicBool,
    state: Mutex<RoutingState>,
}

fn route_frame(shared: &SessionShared, source_id: &str, frame: &[u8], src_format: &AudioFormat) {
    // Step 1: fast path, no lock.
    if !shared.valid.load(Ordering::Acquire) {
        return;
    }

    // Step 2: short critical section.
    let mut state = shared.state.lock().unwrap();
    if state.paused {
        return;
    }

    // Step 3/4: matching rules, insertion order, volume+silence, convert
    // to the destination's resolved format if needed, submit.
    let mut scratch = Vec::new();
    let mut convert_scratch = Vec::new();
    for rule in state.rules.clone() {
        if !rule.matches(source_id) {
            continue;
        }
        let mut to_submit: &[u8] = if (rule.volume_multiplier - 1.0).abs() > 0.004 {
            scratch.clear();
            scratch.extend_from_slice(frame);
            if engine_format::apply_gain(&mut scratch, src_format, rule.volume_multiplier).is_err() {
                continue;
            }
            &scratch
        } else {
            frame
        };
        if rule.skip_silence {
            if let Ok(true) = engine_format::is_silent(to_submit, src_format, 0.01) {
                continue;
            }
        }
        if let Some(dest_format) = state.destination_formats.get(&rule.destination) {
            if dest_format != src_format {
                if engine_format::convert(to_submit, src_format, dest_format, &mut convert_scratch).is_err() {
                    continue;
                }
                to_submit = &convert_scratch;
            }
        }
        let mut remove = false;
        if let Some(sink) = state.destinations.get_mut(&rule.destination) {
            if sink.submit(to_submit).is_err() {
                remove = true;
            }
        }
        if remove {
            if let Some(mut sink) = state.destinations.remove(&rule.destination) {
                let _ = sink.close();
                state.last_error = Some(format!("destination {} removed after submit failure", rule.destination));
            }
        }
    }

    // Step 5: mixer admission.
    let mixer_present = state.mixer.is_some();
    if mixer_present {
        if let Some(mixer) = state.mixer.as_mut() {
            let _ = mixer.add(source_id, frame, *src_format);
        }
    }

    // Step 6: the mixer driver triggers a pull.
    if state.driver_source.as_deref() == Some(source_id) {
        let mut mixed = Vec::new();
        let produced = state
            .mixer
            .as_mut()
            .map(|m| m.pull_mixed(&mut mixed))
            .transpose()
            .unwrap_or(Some(0))
            .unwrap_or(0);
        if produced > 0 {
            if let Some(dest_id) = state.mixed_destination.clone() {
                if let Some(sink) = state.destinations.get_mut(&dest_id) {
                    let _ = sink.submit(&mixed);
                }
            }
        }
    }
}

/// One active capture/route/sink session.
pub struct Session {
    id: u64,
    shared: Arc<SessionShared>,
    sources: HashMap<SourceId, InputSource>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.shared.valid.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().unwrap().last_error.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().unwrap().paused
    }
}

/// The admission and dispatch authority over zero or more sessions.
pub struct Router {
    sessions: Mutex<HashMap<u64, Session>>,
    next_id: AtomicU64,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `config`, initializes sources to learn their negotiated
    /// formats, opens destinations against those real formats, designates
    /// the mixer driver, and starts everything. Rolls back cleanly on
    /// any failure (§4.H).
    pub fn start_session(&self, config: CaptureConfig, make_client: &ClientFactory) -> Result<u64, EngineError> {
        validate_config(&config)?;

        // Phase 1: construct and initialize every source first, so each
        // destination can be opened against the source's actual
        // negotiated format rather than an assumed one (§3, §8 "Size
        // alignment" — a destination's block size must match what it is
        // actually fed).
        let mut sources: HashMap<SourceId, InputSource> = HashMap::new();
        let mut initialized: Vec<SourceId> = Vec::new();

        let stop_initialized = |sources: &mut HashMap<SourceId, InputSource>, initialized: &[SourceId]| {
            for id in initialized {
                if let Some(source) = sources.get_mut(id) {
                    let _ = source.client_mut().stop();
                }
            }
        };

        for spec in &config.sources {
            let mut client = match make_client(&spec.target) {
                Ok(c) => c,
                Err(e) => {
                    stop_initialized(&mut sources, &initialized);
                    return Err(e);
                }
            };
            if let Err(e) = client.initialize(spec.target.clone()) {
                stop_initialized(&mut sources, &initialized);
                return Err(e);
            }
            client.set_gain(spec.gain);
            let input = InputSource::new(spec.id.clone(), spec.id.clone(), &spec.target, client);
            sources.insert(spec.id.clone(), input);
            initialized.push(spec.id.clone());
        }

        // Phase 2: pick the mixer driver (explicit config wins, else the
        // highest-rate source) and the mixer's target format.
        let mut driver_source: Option<SourceId> = config.mixed.driver_source_id.clone();
        let mut best_rate = 0u32;
        for spec in &config.sources {
            if let Some(format) = sources.get(&spec.id).and_then(|s| s.format()) {
                if driver_source.is_none() && format.sample_rate() > best_rate {
                    best_rate = format.sample_rate();
                    driver_source = Some(spec.id.clone());
                }
            }
        }

        let mixer = if config.mixed.enabled {
            let target = mixer_target_format(&config, &sources).ok_or_else(|| EngineError::ConfigRejected {
                field: "mixed".into(),
                reason: "no source format available to derive mixer target".into(),
            })?;
            Some(Mixer::new(target))
        } else {
            None
        };

        // Phase 3: open destinations against the real negotiated format
        // of whichever source(s) a rule routes to them.
        let mut destinations: HashMap<DestinationId, Box<dyn AudioSink>> = HashMap::new();
        let mut destination_formats: HashMap<DestinationId, AudioFormat> = HashMap::new();
        let mut opened: Vec<DestinationId> = Vec::new();

        let rollback_destinations = |destinations: &mut HashMap<DestinationId, Box<dyn AudioSink>>, opened: &[DestinationId]| {
            for id in opened {
                if let Some(mut sink) = destinations.remove(id) {
                    let _ = sink.close();
                }
            }
        };

        for spec in &config.destinations {
            let mut sink = build_sink(spec.kind);
            let format = match resolve_destination_format(&config, &sources, spec) {
                Ok(f) => f,
                Err(e) => {
                    rollback_destinations(&mut destinations, &opened);
                    stop_initialized(&mut sources, &initialized);
                    return Err(e);
                }
            };
            if let Err(e) = sink.configure(format, spec.config.clone()) {
                rollback_destinations(&mut destinations, &opened);
                stop_initialized(&mut sources, &initialized);
                return Err(e.into());
            }
            destinations.insert(spec.id.clone(), sink);
            destination_formats.insert(spec.id.clone(), format);
            opened.push(spec.id.clone());
        }

        // Phase 4: wire each source's callback and start it.
        let shared = Arc::new(SessionShared {
            valid: AtomicBool::new(true),
            state: Mutex::new(RoutingState {
                destinations,
                destination_formats,
                rules: config.rules.clone(),
                mixer,
                mixed_destination: config.mixed.destination.clone(),
                driver_source,
                paused: false,
                last_error: None,
            }),
        });

        let mut start_failure: Option<EngineError> = None;
        for (source_id, source) in sources.iter_mut() {
            let cb_shared = Arc::clone(&shared);
            let cb_source_id = source_id.clone();
            let format = match source.format() {
                Some(f) => f,
                None => {
                    start_failure = Some(EngineError::Internal("source format missing after initialize".into()));
                    break;
                }
            };
            let callback: CaptureCallback = Box::new(move |frame: &[u8]| {
                route_frame(&cb_shared, &cb_source_id, frame, &format);
            });
            source.client_mut().set_callback(callback);
            if let Err(e) = source.client_mut().start() {
                start_failure = Some(e);
                break;
            }
        }

        if let Some(e) = start_failure {
            shared.valid.store(false, Ordering::Release);
            stop_initialized(&mut sources, &initialized);
            let destinations: Vec<Box<dyn AudioSink>> =
                shared.state.lock().unwrap().destinations.drain().map(|(_, s)| s).collect();
            for mut sink in destinations {
                let _ = sink.close();
            }
            return Err(e);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Session { id, shared, sources };
        self.sessions.lock().unwrap().insert(id, session);
        Ok(id)
    }

    /// Clears `isValid` first, then — without holding the session lock —
    /// stops every source and closes every destination (§4.H's critical
    /// deadlock rule).
    pub fn stop_session(&self, id: u64) -> Result<(), EngineError> {
        let session = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.remove(&id)
        };
        let Some(mut session) = session else {
            return Err(EngineError::Internal(format!("no such session: {id}")));
        };
        session.shared.valid.store(false, Ordering::Release);

        for (_, source) in session.sources.iter_mut() {
            let _ = source.client_mut().stop();
        }
        let destinations: Vec<Box<dyn AudioSink>> = {
            let mut state = session.shared.state.lock().unwrap();
            state.destinations.drain().map(|(_, sink)| sink).collect()
        };
        for mut sink in destinations {
            let _ = sink.close();
        }
        Ok(())
    }

    pub fn pause_session(&self, id: u64) -> Result<(), EngineError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(&id).ok_or_else(|| EngineError::Internal(format!("no such session: {id}")))?;
        session.shared.state.lock().unwrap().paused = true;
        Ok(())
    }

    pub fn resume_session(&self, id: u64) -> Result<(), EngineError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(&id).ok_or_else(|| EngineError::Internal(format!("no such session: {id}")))?;
        session.shared.state.lock().unwrap().paused = false;
        Ok(())
    }

    pub fn add_routing_rule(&self, id: u64, rule: RoutingRule) -> Result<(), EngineError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(&id).ok_or_else(|| EngineError::Internal(format!("no such session: {id}")))?;
        let mut state = session.shared.state.lock().unwrap();
        if state.rules.iter().any(|r| r.destination == rule.destination && r.source == rule.source) {
            return Err(EngineError::ConfigRejected {
                field: "rules".into(),
                reason: "duplicate routing rule".into(),
            });
        }
        state.rules.push(rule);
        Ok(())
    }

    pub fn remove_destination(&self, id: u64, destination_id: &str) -> Result<(), EngineError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(&id).ok_or_else(|| EngineError::Internal(format!("no such session: {id}")))?;
        let mut state = session.shared.state.lock().unwrap();
        if state.mixed_destination.as_deref() == Some(destination_id) {
            return Err(EngineError::ConfigRejected {
                field: "destination".into(),
                reason: "cannot remove a destination referenced by the mixed-output collaborator".into(),
            });
        }
        if let Some(mut sink) = state.destinations.remove(destination_id) {
            let _ = sink.close();
        }
        Ok(())
    }

    /// Supplemented from `CaptureManager::StopAll` (§4.H.sup). Collects
    /// session ids under the map lock, then applies `stop_session` to
    /// each outside it — the same deadlock-avoidance shape at manager
    /// scope.
    pub fn stop_all(&self) {
        let ids: Vec<u64> = self.sessions.lock().unwrap().keys().copied().collect();
        for id in ids {
            let _ = self.stop_session(id);
        }
    }

    pub fn pause_all(&self) {
        let ids: Vec<u64> = self.sessions.lock().unwrap().keys().copied().collect();
        for id in ids {
            let _ = self.pause_session(id);
        }
    }

    pub fn resume_all(&self) {
        let ids: Vec<u64> = self.sessions.lock().unwrap().keys().copied().collect();
        for id in ids {
            let _ = self.resume_session(id);
        }
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_session_active(&self, id: u64) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .map(|s| s.is_valid())
            .unwrap_or(false)
    }
}

fn validate_config(config: &CaptureConfig) -> Result<(), EngineError> {
    if config.sources.is_empty() {
        return Err(EngineError::ConfigRejected {
            field: "sources".into(),
            reason: "at least one source is required".into(),
        });
    }
    if config.destinations.is_empty() && !config.mixed.enabled {
        return Err(EngineError::ConfigRejected {
            field: "destinations".into(),
            reason: "at least one destination or mixed output is required".into(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    for s in &config.sources {
        if !seen.insert(&s.id) {
            return Err(EngineError::ConfigRejected {
                field: "sources".into(),
                reason: format!("duplicate source id: {}", s.id),
            });
        }
    }
    let mut seen_dest = std::collections::HashSet::new();
    for d in &config.destinations {
        if !seen_dest.insert(&d.id) {
            return Err(EngineError::ConfigRejected {
                field: "destinations".into(),
                reason: format!("duplicate destination id: {}", d.id),
            });
        }
    }
    Ok(())
}

/// The mixer's single target format: the configured driver source's
/// negotiated format if one is named, else the first source with a
/// resolved format (matching the "highest rate wins" driver pick in
/// `start_session` when no driver is named explicitly).
fn mixer_target_format(config: &CaptureConfig, sources: &HashMap<SourceId, InputSource>) -> Option<AudioFormat> {
    if let Some(driver_id) = &config.mixed.driver_source_id {
        if let Some(format) = sources.get(driver_id).and_then(|s| s.format()) {
            return Some(format);
        }
    }
    config.sources.iter().find_map(|spec| sources.get(&spec.id).and_then(|s| s.format()))
}

/// Resolves the format a destination should be opened with, from the
/// sources' actual negotiated formats (`InputSource::format()`), not an
/// assumed constant (§3: every submitted frame must be a whole multiple
/// of the destination's configured block size).
///
/// The mixed-output destination takes the mixer's target format.
/// Otherwise: a rule naming this destination with a specific source uses
/// that source's format; the wildcard rule (`source: None`) uses the
/// first configured source's format, since `route_frame` converts every
/// other source's frames into this format per rule before submission.
fn resolve_destination_format(
    config: &CaptureConfig,
    sources: &HashMap<SourceId, InputSource>,
    spec: &DestinationSpec,
) -> Result<AudioFormat, EngineError> {
    if config.mixed.enabled && config.mixed.destination.as_deref() == Some(spec.id.as_str()) {
        return mixer_target_format(config, sources).ok_or_else(|| EngineError::ConfigRejected {
            field: "mixed".into(),
            reason: "no source format available to derive mixer target".into(),
        });
    }

    let matching_rules = config.rules.iter().filter(|r| r.destination == spec.id);
    let mut wildcard_present = false;
    for rule in matching_rules {
        match &rule.source {
            Some(source_id) => {
                if let Some(format) = sources.get(source_id).and_then(|s| s.format()) {
                    return Ok(format);
                }
            }
            None => wildcard_present = true,
        }
    }
    if wildcard_present {
        if let Some(format) = config.sources.first().and_then(|s| sources.get(&s.id)).and_then(|s| s.format()) {
            return Ok(format);
        }
    }

    config
        .sources
        .first()
        .and_then(|s| sources.get(&s.id))
        .and_then(|s| s.format())
        .ok_or_else(|| EngineError::ConfigRejected {
            field: "sources".into(),
            reason: format!("no source routes to destination {} with a resolvable format", spec.id),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DestinationSpec, MixedOutputConfig, SourceSpec};
    use engine_format::SampleLayout;

    struct StubClient {
        format: AudioFormat,
        callback: Option<CaptureCallback>,
    }

    impl CaptureClient for StubClient {
        fn initialize(&mut self, _target: CaptureTarget) -> Result<(), EngineError> {
            Ok(())
        }
        fn start(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_callback(&mut self, callback: CaptureCallback) {
            self.callback = Some(callback);
        }
        fn format(&self) -> Option<AudioFormat> {
            Some(self.format)
        }
        fn set_gain(&self, _gain: f32) {}
        fn pause(&mut self) {}
        fn resume(&mut self) {}
    }

    fn stub_factory(_target: &CaptureTarget) -> Result<Box<dyn CaptureClient>, EngineError> {
        Ok(Box::new(StubClient {
            format: AudioFormat::new(1, 48_000, SampleLayout::Int16, None).unwrap(),
            callback: None,
        }))
    }

    fn minimal_config() -> CaptureConfig {
        CaptureConfig {
            sources: vec![SourceSpec {
                id: "system:default".into(),
                target: CaptureTarget::SystemDefaultLoopback,
                gain: 1.0,
            }],
            destinations: vec![DestinationSpec {
                id: "dest.wav".into(),
                kind: DestinationKind::Wav,
                config: DestinationConfig {
                    output_path: "/tmp/engine_core_test.wav".into(),
                    ..Default::default()
                },
            }],
            rules: vec![RoutingRule {
                source: None,
                destination: "dest.wav".into(),
                volume_multiplier: 1.0,
                skip_silence: false,
            }],
            mixed: MixedOutputConfig::default(),
        }
    }

    struct SpySink {
        last_submit_len: Arc<Mutex<Option<usize>>>,
    }

    impl AudioSink for SpySink {
        fn configure(&mut self, _format: AudioFormat, _config: DestinationConfig) -> Result<(), engine_sinks::SinkError> {
            Ok(())
        }
        fn submit(&mut self, frame: &[u8]) -> Result<(), engine_sinks::SinkError> {
            *self.last_submit_len.lock().unwrap() = Some(frame.len());
            Ok(())
        }
        fn close(&mut self) -> Result<(), engine_sinks::SinkError> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
        fn last_error(&self) -> Option<String> {
            None
        }
        fn set_paused(&mut self, _paused: bool) {}
    }

    #[test]
    fn test_resolve_destination_format_uses_specific_source_when_ruled() {
        let mut sources: HashMap<SourceId, InputSource> = HashMap::new();
        sources.insert(
            "mic".into(),
            InputSource::new(
                "mic".into(),
                "mic".into(),
                &CaptureTarget::DeviceCapture("mic".into()),
                Box::new(StubClient {
                    format: AudioFormat::new(1, 44_100, SampleLayout::Int16, None).unwrap(),
                    callback: None,
                }),
            ),
        );
        let config = CaptureConfig {
            sources: vec![SourceSpec {
                id: "mic".into(),
                target: CaptureTarget::DeviceCapture("mic".into()),
                gain: 1.0,
            }],
            destinations: vec![DestinationSpec {
                id: "dest.wav".into(),
                kind: DestinationKind::Wav,
                config: DestinationConfig::default(),
            }],
            rules: vec![RoutingRule {
                source: Some("mic".into()),
                destination: "dest.wav".into(),
                volume_multiplier: 1.0,
                skip_silence: false,
            }],
            mixed: MixedOutputConfig::default(),
        };
        let format = resolve_destination_format(&config, &sources, &config.destinations[0]).unwrap();
        assert_eq!(format.sample_rate(), 44_100);
        assert_eq!(format.channels(), 1);
    }

    #[test]
    fn test_route_frame_converts_when_source_format_differs_from_destination() {
        let src_format = AudioFormat::new(1, 44_100, SampleLayout::Float32, None).unwrap();
        let dest_format = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
        let last_len = Arc::new(Mutex::new(None));
        let mut destinations: HashMap<DestinationId, Box<dyn AudioSink>> = HashMap::new();
        destinations.insert(
            "dest.wav".into(),
            Box::new(SpySink {
                last_submit_len: Arc::clone(&last_len),
            }),
        );
        let mut destination_formats = HashMap::new();
        destination_formats.insert("dest.wav".to_string(), dest_format);

        let shared = SessionShared {
            valid: AtomicBool::new(true),
            state: Mutex::new(RoutingState {
                destinations,
                destination_formats,
                rules: vec![RoutingRule {
                    source: None,
                    destination: "dest.wav".into(),
                    volume_multiplier: 1.0,
                    skip_silence: false,
                }],
                mixer: None,
                mixed_destination: None,
                driver_source: None,
                paused: false,
                last_error: None,
            }),
        };

        let frame = vec![0u8; src_format.block_size() * 441];
        route_frame(&shared, "mic", &frame, &src_format);

        let submitted = last_len.lock().unwrap().expect("sink should have received a submission");
        let expected_frames = (441f64 * 48_000.0 / 44_100.0).floor() as usize;
        assert_eq!(submitted, expected_frames * dest_format.block_size());
    }

    #[test]
    fn test_start_and_stop_session() {
        let router = Router::new();
        let id = router.start_session(minimal_config(), &stub_factory).unwrap();
        assert!(router.is_session_active(id));
        assert_eq!(router.active_session_count(), 1);
        router.stop_session(id).unwrap();
        assert_eq!(router.active_session_count(), 0);
    }

    #[test]
    fn test_rejects_empty_sources() {
        let router = Router::new();
        let mut config = minimal_config();
        config.sources.clear();
        assert!(router.start_session(config, &stub_factory).is_err());
    }

    #[test]
    fn test_rejects_duplicate_source_ids() {
        let router = Router::new();
        let mut config = minimal_config();
        let dup = config.sources[0].clone();
        config.sources.push(dup);
        assert!(router.start_session(config, &stub_factory).is_err());
    }

    #[test]
    fn test_pause_resume_roundtrip() {
        let router = Router::new();
        let id = router.start_session(minimal_config(), &stub_factory).unwrap();
        router.pause_session(id).unwrap();
        assert!(router.sessions.lock().unwrap().get(&id).unwrap().is_paused());
        router.resume_session(id).unwrap();
        assert!(!router.sessions.lock().unwrap().get(&id).unwrap().is_paused());
        router.stop_session(id).unwrap();
    }

    #[test]
    fn test_clean_shutdown_under_continuous_load() {
        let router = Router::new();
        let id = router.start_session(minimal_config(), &stub_factory).unwrap();
        let shared = {
            let sessions = router.sessions.lock().unwrap();
            Arc::clone(&sessions.get(&id).unwrap().shared)
        };
        let format = AudioFormat::new(1, 48_000, SampleLayout::Int16, None).unwrap();
        let frame = vec![0u8; format.block_size() * 10];
        for _ in 0..500 {
            route_frame(&shared, "system:default", &frame, &format);
        }
        let start = std::time::Instant::now();
        router.stop_session(id).unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(router.active_session_count(), 0);
    }

    #[test]
    fn test_stop_all_clears_every_session() {
        let router = Router::new();
        router.start_session(minimal_config(), &stub_factory).unwrap();
        let mut second = minimal_config();
        second.sources[0].id = "system:default2".into();
        second.destinations[0].id = "dest2.wav".into();
        second.destinations[0].config.output_path = "/tmp/engine_core_test2.wav".into();
        second.rules[0].destination = "dest2.wav".into();
        router.start_session(second, &stub_factory).unwrap();
        assert_eq!(router.active_session_count(), 2);
        router.stop_all();
        assert_eq!(router.active_session_count(), 0);
    }
}
