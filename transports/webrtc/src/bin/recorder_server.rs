//! Recorder server binary entry point
//!
//! Serves the capture page and the signaling WebSocket, records one browser
//! session to disk and exits once that session ends.
//!
//! # Usage
//!
//! ```bash
//! # Record into ./output.ogg and ./output.ivf (default: 0.0.0.0:8080)
//! cargo run --bin recorder_server
//!
//! # Record into a dedicated folder per session
//! cargo run --bin recorder_server -- \
//!   --output-dir ./recordings \
//!   --per-session-dirs
//!
//! # Custom STUN servers and keyframe interval
//! cargo run --bin recorder_server -- \
//!   --stun-servers stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302 \
//!   --keyframe-interval-ms 2000
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webrtc_recorder::signaling::server;
use webrtc_recorder::{OutputConfig, RecorderConfig, ServerState};

/// WebRTC Recorder Server
///
/// Receives a browser's camera and microphone over WebRTC and writes them
/// to Ogg/Opus and IVF/VP8 files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP/WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "RECORDER_LISTEN_ADDR")]
    listen_addr: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "RECORDER_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// Interval between keyframe requests in milliseconds
    #[arg(long, default_value_t = 3000, env = "RECORDER_KEYFRAME_INTERVAL_MS")]
    keyframe_interval_ms: u64,

    /// Directory for the recorded files
    #[arg(long, default_value = ".", env = "RECORDER_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Ogg/Opus file name
    #[arg(long, default_value = "output.ogg", env = "RECORDER_AUDIO_FILE")]
    audio_file: String,

    /// IVF/VP8 file name
    #[arg(long, default_value = "output.ivf", env = "RECORDER_VIDEO_FILE")]
    video_file: String,

    /// Sample rate written into the Ogg header
    #[arg(long, default_value_t = 48000, env = "RECORDER_AUDIO_SAMPLE_RATE")]
    audio_sample_rate: u32,

    /// Channel count written into the Ogg header
    #[arg(long, default_value_t = 2, env = "RECORDER_AUDIO_CHANNELS")]
    audio_channels: u8,

    /// Write each session into its own subdirectory
    #[arg(long, default_value_t = false, env = "RECORDER_PER_SESSION_DIRS")]
    per_session_dirs: bool,
}

impl From<Args> for RecorderConfig {
    fn from(args: Args) -> Self {
        RecorderConfig {
            listen_addr: args.listen_addr,
            stun_servers: args.stun_servers,
            keyframe_interval_ms: args.keyframe_interval_ms,
            output: OutputConfig {
                dir: args.output_dir,
                audio_file_name: args.audio_file,
                video_file_name: args.video_file,
                audio_sample_rate: args.audio_sample_rate,
                audio_channels: args.audio_channels,
                per_session_dirs: args.per_session_dirs,
            },
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up Ctrl+C handler before the runtime starts
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }

        eprintln!("\nCtrl+C received, finalizing recording...");

        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            eprintln!("Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("recorder-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = RecorderConfig::from(args);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        stun_servers = ?config.stun_servers,
        keyframe_interval_ms = config.keyframe_interval_ms,
        output_dir = ?config.output.dir,
        per_session_dirs = config.output.per_session_dirs,
        "Recorder server starting"
    );

    let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
    let (state, mut ended_rx) = ServerState::new(config);

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_state).await {
            error!("Signaling server stopped: {}", e);
        }
    });

    info!("Open the page in a browser to start recording. Press Ctrl+C to stop.");

    let wait_for_ctrl_c = async {
        while !shutdown_flag.load(Ordering::SeqCst) {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    };

    let interrupted = tokio::select! {
        ended = ended_rx.recv() => {
            if let Some(ended) = ended {
                log_session_end(&ended);
            }
            false
        }
        _ = wait_for_ctrl_c => true,
    };

    if interrupted {
        info!("Shutdown signal received, cleaning up...");
        if state.request_shutdown() {
            if let Some(ended) = ended_rx.recv().await {
                log_session_end(&ended);
            }
        }
    }

    info!("Recorder server exiting");
    Ok(())
}

fn log_session_end(ended: &webrtc_recorder::SessionEnded) {
    match &ended.teardown_error {
        None => info!(
            session_id = %ended.session_id,
            reason = %ended.reason,
            "Session ended, recording finalized"
        ),
        Some(e) => warn!(
            session_id = %ended.session_id,
            reason = %ended.reason,
            "Session ended with teardown error: {}",
            e
        ),
    }
}

fn init_tracing() {
    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
