//! Capture client contract, input sources, the mixer, and the
//! session/router: the OS-independent heart of the engine. Concrete OS
//! bindings live in `engine_platform`; concrete sinks in `engine_sinks`.

mod capture;
mod error;
mod message;
mod mixer;
mod session;

pub use capture::{ids, CaptureCallback, CaptureClient, CaptureTarget, InputSource, SourceCategory};
pub use error::{EngineError, EngineResult};
pub use message::{
    CaptureConfig, Command, DestinationId, DestinationKind, DestinationSpec, Event, MixedOutputConfig,
    RoutingRule, SessionId, SourceId, SourceSpec,
};
pub use mixer::Mixer;
pub use session::{ClientFactory, Router, Session};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _router = Router::new();
        let _ = ids::system_default();
    }
}
