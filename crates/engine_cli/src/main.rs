//! Driver program hosting the engine (§6.amb).
//!
//! `clap`-derived, following the `Parser`/`Subcommand` pattern used by
//! the retrieved `win-loopback-to-mp3` CLI: subcommands for listing
//! devices/processes and for starting a recording session either from a
//! JSON config or from a one-shot `--source`/`--to` pair.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use engine_core::{
    CaptureConfig, CaptureTarget, DestinationKind, DestinationSpec, EngineError, MixedOutputConfig, Router,
    RoutingRule, SourceSpec,
};
use engine_sinks::DestinationConfig;

#[derive(Parser, Debug)]
#[command(name = "engine_cli")]
#[command(about = "Capture, route, and mix audio from heterogeneous sources.")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print enumerated render/capture devices.
    ListDevices,
    /// Print audio-producing processes (Windows: marks active sessions).
    ListProcesses,
    /// Start a session from a JSON `CaptureConfig` file.
    Record {
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long = "duration-secs")]
        duration_secs: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match cli.cmd {
        Command::ListDevices => run_list_devices(),
        Command::ListProcesses => run_list_processes(),
        Command::Record {
            config,
            source,
            to,
            duration_secs,
        } => run_record(config, source, to, duration_secs),
    };
    ExitCode::from(code)
}

fn run_list_devices() -> u8 {
    match engine_platform::enumerate_devices() {
        Ok(devices) => {
            for d in devices {
                println!("{:?}\t{}\t{}\tdefault={}", d.direction, d.device_id, d.friendly_name, d.is_default);
            }
            0
        }
        Err(e) => {
            tracing::error!(%e, "failed to enumerate devices");
            3
        }
    }
}

fn run_list_processes() -> u8 {
    match engine_platform::enumerate_audio_processes() {
        Ok(processes) => {
            for p in processes {
                println!("{}\t{}\taudio={}", p.pid, p.exe_name, p.has_active_audio);
            }
            0
        }
        Err(e) => {
            tracing::error!(%e, "failed to enumerate processes");
            3
        }
    }
}

fn run_record(config_path: Option<String>, source: Option<String>, to: Option<String>, duration_secs: Option<u64>) -> u8 {
    let config = match (config_path, source, to) {
        (Some(path), _, _) => match load_config(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(%e, "failed to load config");
                return 2;
            }
        },
        (None, Some(source), Some(to)) => match synthesize_config(&source, &to) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(%e, "invalid --source");
                return 2;
            }
        },
        _ => {
            tracing::error!("record requires either --config or both --source and --to");
            return 2;
        }
    };

    let router = Router::new();
    let session_id = match router.start_session(config, &engine_platform::make_capture_client) {
        Ok(id) => id,
        Err(e) => return exit_code_for(&e),
    };

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if ctrlc::set_handler(move || handler_flag.store(false, Ordering::Release)).is_err() {
        tracing::warn!("failed to install ctrl-c handler; relying on --duration-secs only");
    }

    let deadline = duration_secs.map(|s| std::time::Instant::now() + Duration::from_secs(s));
    while running.load(Ordering::Acquire) {
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = router.stop_session(session_id) {
        return exit_code_for(&e);
    }
    0
}

fn load_config(path: &str) -> Result<CaptureConfig, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRejected {
        field: "config".into(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| EngineError::ConfigRejected {
        field: "config".into(),
        reason: e.to_string(),
    })
}

/// `--source <spec> --to <path>` synthesizes a minimal single-source,
/// single-destination config without a JSON file (§6.amb). `spec` is one
/// of `system`, `process:<pid>`, or `device:<name>`.
fn synthesize_config(spec: &str, to: &str) -> Result<CaptureConfig, EngineError> {
    let (id, target) = if spec == "system" {
        ("system:default".to_string(), CaptureTarget::SystemDefaultLoopback)
    } else if let Some(pid) = spec.strip_prefix("process:") {
        let pid: u32 = pid.parse().map_err(|_| EngineError::ConfigRejected {
            field: "source".into(),
            reason: format!("invalid pid: {pid}"),
        })?;
        (format!("process:{pid}"), CaptureTarget::ProcessLoopback(pid))
    } else if let Some(name) = spec.strip_prefix("device:") {
        (format!("device:{name}"), CaptureTarget::DeviceCapture(name.to_string()))
    } else {
        return Err(EngineError::ConfigRejected {
            field: "source".into(),
            reason: format!("unrecognized source spec: {spec}"),
        });
    };

    let kind = match to.rsplit('.').next() {
        Some("mp3") => DestinationKind::Mp3,
        Some("opus") | Some("ogg") => DestinationKind::Opus,
        Some("flac") => DestinationKind::Flac,
        _ => DestinationKind::Wav,
    };

    Ok(CaptureConfig {
        sources: vec![SourceSpec {
            id: id.clone(),
            target,
            gain: 1.0,
        }],
        destinations: vec![DestinationSpec {
            id: to.to_string(),
            kind,
            config: DestinationConfig {
                output_path: to.to_string(),
                ..Default::default()
            },
        }],
        rules: vec![RoutingRule {
            source: None,
            destination: to.to_string(),
            volume_multiplier: 1.0,
            skip_silence: false,
        }],
        mixed: MixedOutputConfig::default(),
    })
}

/// Maps an `EngineError` to the exit codes §6 documents.
fn exit_code_for(err: &EngineError) -> u8 {
    tracing::error!(%err, "session error");
    match err {
        EngineError::ConfigRejected { .. } => 2,
        EngineError::Unavailable { .. } => 3,
        EngineError::IoFailure { .. } | EngineError::SinkError(_) => 4,
        EngineError::StreamFault { .. } | EngineError::Internal(_) | EngineError::FormatError(_) => 5,
    }
}
