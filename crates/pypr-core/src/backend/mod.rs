//! Compositor backend abstraction.
//!
//! One backend instance is shared by the whole daemon; plugins talk to it
//! through a [`proxy::BackendProxy`] so every operation is logged under the
//! calling plugin's name.

mod fallback;
mod hyprland;
mod niri;
pub mod proxy;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use pypr_types::{ClientInfo, Environment, MonitorInfo};
use serde_json::Value;
use tokio::net::UnixStream;
use tracing::{debug, info};

pub use fallback::{WaylandBackend, XorgBackend, parse_wlr_randr_output, parse_xrandr_output};
pub use hyprland::HyprlandBackend;
pub use niri::NiriBackend;

use crate::error::{Error, Result};

pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 5000;
pub const ERROR_NOTIFICATION_DURATION_MS: u64 = 8000;

/// Notification flavor, mapped to icon/color per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Default,
    Info,
    Error,
}

const NOTIFY_AUTO: u8 = 0;
const NOTIFY_SEND: u8 = 1;
const NOTIFY_NATIVE: u8 = 2;

static NOTIFY_METHOD: AtomicU8 = AtomicU8::new(NOTIFY_AUTO);

/// Process-wide notification method override (`notification_type` option).
pub fn set_notify_method(method: &str) {
    let value = match method {
        "notify-send" => NOTIFY_SEND,
        "native" => NOTIFY_NATIVE,
        _ => NOTIFY_AUTO,
    };
    NOTIFY_METHOD.store(value, Ordering::Relaxed);
}

fn forced_notify_send() -> bool {
    NOTIFY_METHOD.load(Ordering::Relaxed) == NOTIFY_SEND
}

/// Send a desktop notification through `notify-send`.
pub async fn notify_send(message: &str, duration_ms: u64) {
    let escaped = message.replace('"', "\\\"");
    let result = tokio::process::Command::new("notify-send")
        .arg("-t")
        .arg(duration_ms.to_string())
        .arg("Pyprland")
        .arg(&escaped)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        debug!("notify-send failed: {e}");
    }
}

/// Uniform compositor API.
///
/// Window helpers have default bodies composing Hyprland dispatch commands
/// onto [`Backend::execute`]; backends with other protocols override them.
#[async_trait]
pub trait Backend: Send + Sync {
    fn environment(&self) -> Environment;

    /// List clients, optionally filtered on the mapped flag and by
    /// workspace name (include / exclude).
    async fn get_clients(
        &self,
        mapped: bool,
        workspace: Option<&str>,
        workspace_bl: Option<&str>,
    ) -> Result<Vec<ClientInfo>>;

    async fn get_monitors(&self, include_disabled: bool) -> Result<Vec<MonitorInfo>>;

    /// Dispatch one command. `weak` downgrades failure logs to warnings.
    async fn execute(&self, command: &str, base_command: &str, weak: bool) -> Result<bool>;

    /// Dispatch several commands as one batch, checking the response.
    async fn execute_many(&self, commands: &[String], weak: bool) -> Result<bool>;

    /// Issue a read-only query returning structured data.
    async fn execute_json(&self, command: &str) -> Result<Value>;

    /// Fire-and-forget batch.
    async fn execute_batch(&self, commands: &[String]) -> Result<()>;

    /// Structured action (Niri); other backends reject it.
    async fn execute_action(&self, action: Value) -> Result<bool> {
        Err(Error::Backend(format!(
            "structured actions unsupported on {}: {action}",
            self.environment()
        )))
    }

    async fn notify(&self, message: &str, duration_ms: u64, kind: NotifyKind) -> Result<()>;

    /// Parse one raw event line into `(handler_name, payload)`.
    fn parse_event(&self, raw: &str) -> Option<(String, String)>;

    /// Whether this backend produces an event stream at all.
    fn supports_events(&self) -> bool {
        true
    }

    /// Open the compositor event stream.
    async fn open_event_stream(&self) -> Result<UnixStream>;

    /// Focused monitor data, or the named monitor's.
    async fn get_monitor_props(
        &self,
        name: Option<&str>,
        include_disabled: bool,
    ) -> Result<MonitorInfo> {
        let monitors = self.get_monitors(include_disabled).await?;
        let found = match name {
            Some(wanted) => monitors.into_iter().find(|m| m.name == wanted),
            None => monitors.into_iter().find(|m| m.focused),
        };
        found.ok_or_else(|| Error::Backend("no focused monitor".into()))
    }

    // Window helpers composed from execute().

    async fn focus_window(&self, address: &str) -> Result<bool> {
        self.execute(&format!("focuswindow address:{address}"), "dispatch", false)
            .await
    }

    async fn move_window_to_workspace(
        &self,
        address: &str,
        workspace: &str,
        silent: bool,
    ) -> Result<bool> {
        let verb = if silent {
            "movetoworkspacesilent"
        } else {
            "movetoworkspace"
        };
        self.execute(&format!("{verb} {workspace},address:{address}"), "dispatch", false)
            .await
    }

    async fn pin_window(&self, address: &str) -> Result<bool> {
        self.execute(&format!("pin address:{address}"), "dispatch", false)
            .await
    }

    async fn close_window(&self, address: &str) -> Result<bool> {
        self.execute(&format!("closewindow address:{address}"), "dispatch", false)
            .await
    }

    async fn resize_window(&self, address: &str, width: i32, height: i32) -> Result<bool> {
        self.execute(
            &format!("resizewindowpixel exact {width} {height},address:{address}"),
            "dispatch",
            false,
        )
        .await
    }

    async fn move_window(&self, address: &str, x: i32, y: i32) -> Result<bool> {
        self.execute(
            &format!("movewindowpixel exact {x} {y},address:{address}"),
            "dispatch",
            false,
        )
        .await
    }

    async fn toggle_floating(&self, address: &str) -> Result<bool> {
        self.execute(&format!("togglefloating address:{address}"), "dispatch", false)
            .await
    }

    async fn set_keyword(&self, keyword_command: &str) -> Result<bool> {
        self.execute(keyword_command, "keyword", false).await
    }
}

/// Look up a client by full address, fetching the list when not provided.
pub async fn get_client_by_addr(
    backend: &dyn Backend,
    address: &str,
    clients: Option<&[ClientInfo]>,
) -> Result<Option<ClientInfo>> {
    if let Some(clients) = clients {
        return Ok(clients.iter().find(|c| c.address == address).cloned());
    }
    let fetched = backend.get_clients(false, None, None).await?;
    Ok(fetched.into_iter().find(|c| c.address == address))
}

/// Resolve the backend for the current environment.
///
/// Socket-based detection first (Niri, then Hyprland), then the degraded
/// `wlr-randr` / `xrandr` probes.
///
/// # Errors
///
/// `Error::NoBackend` when nothing is detected.
pub async fn detect_backend() -> Result<Arc<dyn Backend>> {
    if std::env::var("NIRI_SOCKET").is_ok() {
        return Ok(Arc::new(NiriBackend::from_env()?));
    }
    if std::env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() {
        return Ok(Arc::new(HyprlandBackend::from_env()?));
    }
    if WaylandBackend::is_available().await {
        info!("Using generic Wayland backend (wlr-randr) - degraded mode");
        return Ok(Arc::new(WaylandBackend::new()));
    }
    if XorgBackend::is_available().await {
        info!("Using X11/Xorg backend (xrandr) - degraded mode");
        return Ok(Arc::new(XorgBackend::new()));
    }
    Err(Error::NoBackend)
}
