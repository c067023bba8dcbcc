//! pypr daemon entry point.
//!
//! Starts the control-socket server and the compositor event reader, then
//! runs until `pypr exit` or SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use pypr_core::backend::detect_backend;
use pypr_core::paths::control_socket_path;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pypr_daemon::daemon::Daemon;
use pypr_daemon::{control, events};

/// pypr daemon - companion daemon for Hyprland and Niri
#[derive(Parser, Debug)]
#[command(name = "pypr-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Custom configuration file or directory
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pypr={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("pypr-daemon-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("pypr-daemon.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    info!("Starting pypr daemon...");

    let backend = detect_backend().await?;
    let daemon = Daemon::new(backend, args.config);

    // The event stream is optional: the daemon still serves commands when
    // the compositor refuses the connection.
    let event_stream = events::open_event_stream_with_retry(&daemon).await;

    daemon.initialize().await?;

    let socket_path = control_socket_path();
    let listener = control::bind_control_socket(&socket_path).await?;

    if let Some(stream) = event_stream {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            events::read_events_loop(daemon, stream).await;
        });
    }

    let server = {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            control::run_control_server(daemon, listener).await;
        })
    };

    info!("Ready to accept connections");

    let mut stopped = daemon.stopped_rx();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = stopped.changed() => {}
        _ = sigterm.recv() => {
            info!("SIGTERM received");
            daemon.request_stop();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            daemon.request_stop();
        }
    }

    daemon.shutdown_plugins().await;
    server.abort();
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&socket_path) {
            warn!("Failed to remove socket file {}: {e}", socket_path.display());
        }
    }

    info!("pypr daemon stopped");
    Ok(())
}
