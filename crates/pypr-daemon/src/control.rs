//! Control socket server.
//!
//! One request per connection: a single `COMMAND [ARGS…]` line followed by
//! EOF from the client. The response is `OK\n[BODY]` or `ERROR: <msg>\n`.

use std::path::Path;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::daemon::Daemon;
use crate::error::{DaemonError, Result};

/// Bind the control socket, replacing a stale file from a dead daemon.
pub async fn bind_control_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "Another pypr daemon is already running",
            )));
        }
        info!("Removing stale socket at {}", path.display());
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!("Daemon listening on {}", path.display());
    Ok(listener)
}

/// Accept loop; exits when the daemon is stopped.
pub async fn run_control_server(daemon: Arc<Daemon>, listener: UnixListener) {
    let mut stopped = daemon.stopped_rx();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("Accepted connection");
                    let daemon = daemon.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(daemon, stream).await {
                            warn!("Connection error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {e}");
                }
            },
            _ = stopped.changed() => {
                if daemon.is_stopped() {
                    info!("Shutdown requested, stopping server");
                    return;
                }
            }
        }
    }
}

async fn handle_connection(daemon: Arc<Daemon>, stream: UnixStream) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new());

    let Some(line) = framed.next().await else {
        warn!("Empty command received");
        return Ok(());
    };
    let line = line.map_err(|e| DaemonError::Io(std::io::Error::other(e)))?;

    let response = daemon.process_command(&line).await;
    // LinesCodec appends the final newline.
    framed
        .send(response.trim_end_matches('\n'))
        .await
        .map_err(|e| DaemonError::Io(std::io::Error::other(e)))?;

    Ok(())
}
