//! FLIR One Pro streaming CLI.
//!
//! Replays captured chunk directories or streams from a connected camera,
//! printing a summary line per composite frame.

use clap::{Parser, Subcommand};
use flir_one::metrics::{MetricsRegistry, MetricsServer};
use flir_one::source::FileConfig;
use flir_one::{CompositeFrame, FrameStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "flir-one")]
#[command(about = "Userspace streaming driver for the FLIR One Pro Gen-3")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a captured chunk directory
    Replay {
        /// Directory of chunk_<seq>.txt files
        dir: PathBuf,

        /// Pass count: N passes, or -1 to loop forever
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        repeat: i32,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },
    /// Stream from a connected camera
    Live {
        /// Record the raw chunk stream into this directory
        #[arg(long, value_name = "DIR")]
        record: Option<PathBuf>,

        /// Bulk read timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let file_config = cli.config.as_ref().map(|path| {
        FileConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Failed to load config file: {e}");
            std::process::exit(1);
        })
    });

    match cli.command {
        Commands::Replay {
            dir,
            repeat,
            metrics_port,
            frames,
        } => run_replay(&file_config, dir, repeat, metrics_port, frames),
        Commands::Live {
            record,
            timeout_ms,
            metrics_port,
            frames,
        } => run_live(&file_config, record, timeout_ms, metrics_port, frames),
    }
}

fn run_replay(
    file_config: &Option<FileConfig>,
    dir: PathBuf,
    repeat: i32,
    metrics_port: Option<u16>,
    frames: Option<u64>,
) {
    info!("FLIR One driver v{}", flir_one::VERSION);

    let mut options = file_config
        .as_ref()
        .map(|c| c.offline.clone())
        .unwrap_or_default();
    options.repeat = repeat;

    let stream = FrameStream::open_offline(&dir, &options).unwrap_or_else(|e| {
        eprintln!("Failed to open capture directory: {e}");
        std::process::exit(1);
    });

    let registry = spawn_metrics(file_config, metrics_port);
    run_stream(stream, frames, registry);
}

#[cfg(feature = "usb")]
fn run_live(
    file_config: &Option<FileConfig>,
    record: Option<PathBuf>,
    timeout_ms: u64,
    metrics_port: Option<u16>,
    frames: Option<u64>,
) {
    info!("FLIR One driver v{}", flir_one::VERSION);

    let mut options = file_config
        .as_ref()
        .map(|c| c.live.clone())
        .unwrap_or_default();
    options.read_timeout_ms = timeout_ms;
    if record.is_some() {
        options.record_dir = record;
    }

    info!("Opening camera...");
    let stream = FrameStream::open_live(&options).unwrap_or_else(|e| {
        eprintln!("Failed to open camera: {e}");
        eprintln!("\nTroubleshooting:");
        eprintln!("  - Ensure the camera is plugged in and powered on");
        eprintln!("  - Check USB permissions (udev rules on Linux)");
        std::process::exit(1);
    });

    let registry = spawn_metrics(file_config, metrics_port);
    run_stream(stream, frames, registry);
}

#[cfg(not(feature = "usb"))]
fn run_live(
    _file_config: &Option<FileConfig>,
    _record: Option<PathBuf>,
    _timeout_ms: u64,
    _metrics_port: Option<u16>,
    _frames: Option<u64>,
) {
    eprintln!("USB support not compiled. Options:");
    eprintln!("  1. Rebuild with live streaming support:");
    eprintln!("     cargo build --release --features usb");
    eprintln!("  2. Replay a capture instead:");
    eprintln!("     flir-one replay <dir>");
    std::process::exit(1);
}

fn spawn_metrics(
    file_config: &Option<FileConfig>,
    metrics_port: Option<u16>,
) -> Option<Arc<MetricsRegistry>> {
    let port = metrics_port.or_else(|| {
        file_config
            .as_ref()
            .map(|c| c.output.metrics_port)
            .filter(|&p| p != 0)
    })?;

    let registry = match MetricsRegistry::new() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            warn!("Metrics registry unavailable: {e}");
            return None;
        }
    };

    let server = MetricsServer::new(port, Arc::clone(&registry));
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!("Metrics runtime failed: {e}");
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            warn!("Metrics server stopped: {e}");
        }
    });

    Some(registry)
}

fn run_stream(mut stream: FrameStream, limit: Option<u64>, registry: Option<Arc<MetricsRegistry>>) {
    // Ctrl+C stops the pull loop between frames.
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = Arc::clone(&running);
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .ok();
    }

    info!("Streaming frames...");

    let mut emitted = 0u64;
    while running.load(Ordering::SeqCst) && limit.map_or(true, |n| emitted < n) {
        match stream.next_frame() {
            Ok(Some(frame)) => {
                emitted += 1;
                print_frame(&frame);
                if let Some(registry) = &registry {
                    registry.update(stream.counters());
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("Stream failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let counters = stream.counters();
    info!(
        "Finished: {} frames, {} desyncs ({} thermal, {} visible, {} telemetry, {} edge), {} incomplete thermals, {} unknown slices",
        counters.frames_emitted,
        counters.desync_total(),
        counters.thermal_desyncs,
        counters.visible_desyncs,
        counters.telemetry_desyncs,
        counters.edge_desyncs,
        counters.thermal_incomplete,
        counters.unknown_slices,
    );
}

fn print_frame(frame: &CompositeFrame) {
    let thermal = frame
        .thermal()
        .map(|t| {
            let (lo, hi) = t.sample_range();
            format!("{}x{} counts {lo}..{hi}", t.width(), t.height())
        })
        .unwrap_or_else(|| "-".into());
    let visible = frame
        .visible()
        .map(|v| format!("{}x{}", v.width(), v.height()))
        .unwrap_or_else(|| "-".into());
    let battery = frame
        .telemetry()
        .and_then(|t| t.battery_percent)
        .map(|p| format!("{p:.0}%"))
        .unwrap_or_else(|| "-".into());
    let edges = frame
        .edge_mask()
        .map(|m| m.set_count().to_string())
        .unwrap_or_else(|| "-".into());

    info!(
        "frame {:>5}  thermal {}  visible {}  battery {}  edges {}",
        frame.idx(),
        thermal,
        visible,
        battery,
        edges
    );
}
