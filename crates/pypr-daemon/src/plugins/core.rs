//! The built-in `pyprland` core plugin.
//!
//! Keeps the shared state in sync with the compositor: focused window,
//! workspace and monitor, the monitor list, and the compositor version.
//! It runs in-band so other plugins never observe stale state mid-event.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use async_trait::async_trait;
use pypr_core::Result;
use pypr_core::backend::proxy::BackendProxy;
use pypr_core::config::{ConfigField, ConfigView, FieldType, Schema};
use pypr_core::state::SharedStateRef;
use pypr_types::{Environment, VersionInfo, normalize_address};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Plugin, PluginCtx, ReloadReason};

pub static PYPRLAND_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        ConfigField::new("plugins", FieldType::List)
            .required()
            .describe("List of plugins to load"),
        ConfigField::new("include", FieldType::List)
            .describe("Additional config files or folders to include"),
        ConfigField::new("plugins_paths", FieldType::List)
            .default_value(json!([]))
            .describe("Additional paths to search for third-party plugins"),
        ConfigField::new("colored_handlers_log", FieldType::Bool)
            .default_value(json!(true))
            .describe("Enable colored log output for event handlers (debugging)"),
        ConfigField::new("notification_type", FieldType::Str)
            .default_value(json!("auto"))
            .choices(vec![json!("auto"), json!("notify-send"), json!("native")])
            .describe("Notification method: 'auto', 'notify-send', or 'native'"),
        ConfigField::new("variables", FieldType::Dict)
            .default_value(json!({}))
            .describe("User-defined variables for string substitution"),
        ConfigField::new("hyprland_version", FieldType::Str)
            .default_value(json!(""))
            .describe("Override auto-detected compositor version (e.g., '0.40.0')"),
        ConfigField::new("desktop", FieldType::Str)
            .default_value(json!(""))
            .describe("Override auto-detected desktop environment. Empty means auto-detect."),
    ])
});

const EVENT_HANDLERS: &[&str] = &[
    "event_activewindowv2",
    "event_workspace",
    "event_focusedmon",
    "event_monitoradded",
    "event_monitorremoved",
    "event_configreloaded",
    "niri_windowfocuschanged",
    "niri_workspaceactivated",
    "niri_outputschanged",
];

pub struct CorePlugin {
    name: String,
    state: SharedStateRef,
    backend: BackendProxy,
    config: ConfigView,
}

impl CorePlugin {
    #[must_use]
    pub fn new(ctx: PluginCtx) -> Self {
        Self {
            name: ctx.name,
            state: ctx.state,
            backend: ctx.backend,
            config: ConfigView::default(),
        }
    }

    async fn init_hyprland(&mut self) -> Result<()> {
        let version = match self.backend.execute_json("version").await {
            Ok(info) => Self::parse_version_payload(&info),
            Err(e) => {
                warn!("Fail to query compositor version: {e}");
                None
            }
        };
        let version = version.unwrap_or_else(|| {
            warn!("Fail to parse version information - using default");
            VersionInfo::new(9, 9, 9)
        });

        let workspace = match self.backend.execute_json("activeworkspace").await {
            Ok(ws) => ws
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            Err(_) => "unknown".to_string(),
        };

        let mut state = self.state.write().await;
        state.compositor_version = version;
        state.active_workspace = workspace;
        drop(state);

        self.reconcile_monitors().await
    }

    fn parse_version_payload(info: &Value) -> Option<VersionInfo> {
        let tag = info.get("tag").and_then(Value::as_str);
        let candidate = match tag {
            Some(tag) if tag != "unknown" => Some(tag),
            _ => info.get("version").and_then(Value::as_str),
        }?;
        VersionInfo::parse_tag(candidate).ok()
    }

    async fn init_niri(&mut self) -> Result<()> {
        self.reconcile_monitors().await
    }

    /// Re-fetch every monitor, updating the list, the disabled set and the
    /// focused monitor.
    async fn reconcile_monitors(&mut self) -> Result<()> {
        match self.backend.get_monitors(true).await {
            Ok(monitors) => {
                let mut state = self.state.write().await;
                state.monitors = monitors.iter().map(|m| m.name.clone()).collect();
                state.set_disabled_monitors(
                    monitors
                        .iter()
                        .filter(|m| m.disabled)
                        .map(|m| m.name.clone())
                        .collect::<HashSet<_>>(),
                );
                state.active_monitor = monitors
                    .iter()
                    .find(|m| m.focused)
                    .map_or_else(|| "unknown".to_string(), |m| m.name.clone());
            }
            Err(e) => {
                warn!("Compositor socket not available ({e}), assuming empty monitor list");
                let mut state = self.state.write().await;
                state.monitors = Vec::new();
                state.set_disabled_monitors(HashSet::new());
                state.active_monitor = "unknown".to_string();
                state.active_workspace = "unknown".to_string();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Option<&'static Schema> {
        Some(&PYPRLAND_SCHEMA)
    }

    fn event_handlers(&self) -> &'static [&'static str] {
        EVENT_HANDLERS
    }

    fn load_config(&mut self, view: ConfigView) {
        self.config = view;
    }

    async fn init(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.active_window = String::new();
        }
        match self.backend.environment() {
            Environment::Niri => self.init_niri().await,
            Environment::Hyprland => self.init_hyprland().await,
            _ => self.reconcile_monitors().await,
        }
    }

    async fn on_reload(&mut self, _reason: ReloadReason) -> Result<()> {
        let variables: HashMap<String, String> = self
            .config
            .get_dict("variables")
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();

        let version_override = self.config.get_str("hyprland_version");

        let mut state = self.state.write().await;
        state.variables = variables;
        if !version_override.is_empty() {
            match VersionInfo::parse_tag(&version_override) {
                Ok(version) => state.compositor_version = version,
                Err(e) => warn!("Invalid hyprland_version override: {e}"),
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, handler: &str, payload: &str) -> Result<()> {
        match handler {
            "event_activewindowv2" => {
                let mut state = self.state.write().await;
                state.active_window = normalize_address(payload);
                if state.active_window.is_empty() {
                    debug!("no active window");
                } else {
                    debug!("active_window = {}", state.active_window);
                }
            }
            "event_workspace" => {
                let mut state = self.state.write().await;
                state.active_workspace = payload.to_string();
                debug!("active_workspace = {payload}");
            }
            "event_focusedmon" => {
                // Payload is "<monitor>,<workspace>".
                if let Some((monitor, workspace)) = payload.rsplit_once(',') {
                    let mut state = self.state.write().await;
                    state.active_monitor = monitor.to_string();
                    state.active_workspace = workspace.to_string();
                    debug!("active_monitor = {monitor}");
                }
            }
            "event_monitoradded" => {
                let mut state = self.state.write().await;
                let name = payload.to_string();
                if !state.monitors.contains(&name) {
                    state.monitors.push(name);
                }
            }
            "event_monitorremoved" => {
                let mut state = self.state.write().await;
                let before = state.monitors.len();
                state.monitors.retain(|m| m != payload);
                if state.monitors.len() == before {
                    warn!("Monitor {payload} not found in state - can't be removed");
                }
            }
            "event_configreloaded" | "niri_outputschanged" => {
                self.reconcile_monitors().await?;
            }
            "niri_windowfocuschanged" => {
                let parsed: Value = serde_json::from_str(payload).unwrap_or(Value::Null);
                let id = parsed
                    .get("window")
                    .and_then(|w| w.get("id"))
                    .or_else(|| parsed.get("id"))
                    .and_then(Value::as_i64);
                let mut state = self.state.write().await;
                state.active_window = id.map(|i| i.to_string()).unwrap_or_default();
            }
            "niri_workspaceactivated" => {
                let parsed: Value = serde_json::from_str(payload).unwrap_or(Value::Null);
                if let Some(id) = parsed.get("id").and_then(Value::as_i64) {
                    let mut state = self.state.write().await;
                    state.active_workspace = id.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }
}
