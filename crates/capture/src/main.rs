//! fpv-capture
//!
//! Pulls the bulk video feed out of DJI FPV goggles over USB: wake the
//! device with its magic sequence, keep a queue of bulk reads in flight, and
//! write whatever arrives to a file, stdout, or both.

mod config;
mod diag;
mod pipeline;
mod shutdown;
mod usb;

use anyhow::Context as _;
use clap::Parser;
use common::channel::create_capture_bridge;
use common::error::CaptureError;
use common::setup_logging;
use common::sink::{SinkConfig, SinkSet};
use common::types::{CaptureConfig, GOGGLES, VIDEO_INTERFACE};
use pipeline::pump_events;
use shutdown::ShutdownCoordinator;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info};
use usb::spawn_capture_worker;

#[derive(Parser, Debug)]
#[command(name = "fpv-capture")]
#[command(version, about = "Capture the bulk video feed from DJI FPV goggles")]
#[command(long_about = "
Captures the goggles' bulk video feed over USB and writes it to a file,
stdout, or both. With no output selected, verbose counters are enabled so the
run still shows what the device is producing.

EXAMPLES:
    # Pipe the feed straight into a player
    fpv-capture --stdout | ffplay -

    # Record to a file with per-chunk logging
    fpv-capture --file feed.h264 --verbose

    # Inspect the device during bring-up
    fpv-capture --list-interfaces
    fpv-capture --probe-interfaces
")]
struct Args {
    /// Write captured bytes to this file
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Write captured bytes to stdout (pipe into a player)
    #[arg(short = 'o', long)]
    stdout: bool,

    /// USB bulk read size in bytes
    #[arg(short = 's', long = "readsize", value_name = "BYTES")]
    read_size: Option<NonZeroUsize>,

    /// Number of USB read requests kept in flight
    #[arg(short = 'q', long = "queuesize", value_name = "N")]
    queue_size: Option<NonZeroUsize>,

    /// Log per-chunk byte counts and the handshake
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// List the device's interfaces and endpoints, then exit
    #[arg(long)]
    list_interfaces: bool,

    /// Probe interfaces 3-7 for stream traffic, then exit
    #[arg(long)]
    probe_interfaces: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.save_config {
        let config = config::Config::default();
        let path = config::Config::default_path();
        return match config.save(&path).context("Failed to save configuration") {
            Ok(()) => {
                println!("Configuration saved to: {}", path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{:#}", err);
                ExitCode::FAILURE
            }
        };
    }

    let config = if let Some(path) = args.config.clone() {
        match config::Config::load(Some(path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{:#}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        config::Config::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.capture.log_level);
    if let Err(err) = setup_logging(log_level) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    info!("fpv-capture v{}", env!("CARGO_PKG_VERSION"));

    if args.list_interfaces {
        return run_diag(|| diag::list_interfaces(GOGGLES));
    }

    let capture = CaptureConfig {
        chunk_size: args.read_size.unwrap_or(config.capture.read_size),
        queue_depth: args.queue_size.unwrap_or(config.capture.queue_size),
    };

    if args.probe_interfaces {
        return run_diag(|| diag::probe_interfaces(GOGGLES, capture));
    }

    let sink_config = SinkConfig {
        file: args.file.clone(),
        stdout: args.stdout,
        verbose: args.verbose,
    }
    .with_fallback();

    match run_capture(capture, sink_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Run the capture pipeline to completion. Failures are logged where they
/// occur; the returned error only decides the exit code.
async fn run_capture(
    capture: CaptureConfig,
    sink_config: SinkConfig,
) -> Result<(), CaptureError> {
    // Sinks open first so a bad file path fails before any hardware is
    // touched.
    let mut sinks = SinkSet::open(&sink_config).inspect_err(|err| error!("{}", err))?;

    let (bridge, link) = create_capture_bridge(capture.queue_depth.get());
    let worker = spawn_capture_worker(link, GOGGLES, VIDEO_INTERFACE, capture);
    let shutdown = Arc::new(ShutdownCoordinator::new(bridge.clone()));

    spawn_signal_watcher(Arc::clone(&shutdown));

    let mut failure = pump_events(&bridge, &mut sinks, &shutdown).await;

    // The bridge has closed: the capture thread has drained its reads,
    // released the interface, and closed the device. Now the file sink.
    if let Err(err) = sinks.finish() {
        error!("{}", err);
        failure.get_or_insert(err);
    }

    match worker.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!("{}", err);
            failure.get_or_insert(err);
        }
        Err(_) => {
            error!("capture thread panicked");
            failure.get_or_insert(CaptureError::ShutdownStep {
                step: "join capture thread",
                reason: "thread panicked".into(),
            });
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Route interrupt and termination signals into the shutdown coordinator.
/// Repeated signals are absorbed by the coordinator's idempotence.
fn spawn_signal_watcher(shutdown: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        let mut terminate = match unix_signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                error!("cannot install SIGTERM handler: {}", err);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => info!("interrupt received"),
                _ = terminate.recv() => info!("termination signal received"),
            }
            shutdown.trigger().await;
        }
    });
}

fn run_diag(mode: impl FnOnce() -> anyhow::Result<()>) -> ExitCode {
    match mode() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let args =
            Args::try_parse_from(["fpv-capture", "-o", "-s", "1024", "-q", "8", "-v"]).unwrap();
        assert!(args.stdout);
        assert!(args.verbose);
        assert_eq!(args.read_size.unwrap().get(), 1024);
        assert_eq!(args.queue_size.unwrap().get(), 8);
    }

    #[test]
    fn test_zero_read_size_rejected() {
        assert!(Args::try_parse_from(["fpv-capture", "-s", "0"]).is_err());
    }

    #[test]
    fn test_defaults_leave_sizes_unset() {
        let args = Args::try_parse_from(["fpv-capture"]).unwrap();
        assert!(args.read_size.is_none());
        assert!(args.queue_size.is_none());
        assert!(!args.stdout);
    }
}
