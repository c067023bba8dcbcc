//! Compositor event stream reader.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tracing::{error, warn};

use crate::daemon::Daemon;

const EVENT_STREAM_MAX_RETRY: u32 = 10;
const EVENT_STREAM_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Open the event stream, retrying a few times while the compositor
/// settles. Returns `None` when the backend has no stream or the retries
/// are exhausted - the daemon then runs without events.
pub async fn open_event_stream_with_retry(daemon: &Arc<Daemon>) -> Option<UnixStream> {
    if !daemon.proxy.supports_events() {
        return None;
    }
    let mut last_error = None;
    for _ in 0..=EVENT_STREAM_MAX_RETRY {
        match daemon.proxy.open_event_stream().await {
            Ok(stream) => return Some(stream),
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(EVENT_STREAM_RETRY_DELAY).await;
            }
        }
    }
    warn!(
        "Failed to open compositor event stream: {}.",
        last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
    );
    None
}

/// Consume the event stream line by line, dispatching each event.
pub async fn read_events_loop(daemon: Arc<Daemon>, stream: UnixStream) {
    let mut lines = BufReader::new(stream).lines();
    let mut stopped = daemon.stopped_rx();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => daemon.handle_event_line(&line).await,
                Ok(None) => {
                    error!("Reader starved");
                    return;
                }
                Err(e) => {
                    error!("Aborting event loop: {e}");
                    return;
                }
            },
            _ = stopped.changed() => {
                if daemon.is_stopped() {
                    return;
                }
            }
        }
    }
}
