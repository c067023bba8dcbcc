//! Scratchpad object: configuration plus client state.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use pypr_core::config::{ConfigView, coerce_to_bool};
use pypr_types::{ClientInfo, MonitorInfo, VersionInfo};
use serde_json::Value;
use tracing::error;

use super::helpers::MatchRule;
use super::schema::SCRATCHPAD_SCHEMA;

/// Meta properties tracked across show/hide cycles.
#[derive(Default)]
pub struct MetaInfo {
    pub initialized: bool,
    pub should_hide: bool,
    pub no_pid: bool,
    pub last_shown: Option<Instant>,
    /// `(workspace_name, monitor_name)` captured at show time.
    pub space_identifier: (String, String),
    pub monitor_info: Option<MonitorInfo>,
    /// Offsets per full address: the primary relative to its monitor, the
    /// extras relative to the primary.
    pub extra_positions: HashMap<String, (i32, i32)>,
}

/// A scratchpad's configuration with per-monitor overrides applied.
#[derive(Clone, Default)]
pub struct ScratchConfig {
    view: ConfigView,
    monitor_overrides: HashMap<String, serde_json::Map<String, Value>>,
}

impl ScratchConfig {
    fn new(view: ConfigView) -> Self {
        let monitor_overrides = view
            .get_dict("monitor")
            .into_iter()
            .filter_map(|(name, value)| value.as_object().map(|o| (name, o.clone())))
            .collect();
        Self {
            view,
            monitor_overrides,
        }
    }

    /// Option value: `monitor.<mon>.<name>` first, then the top level.
    #[must_use]
    pub fn get(&self, name: &str, mon: &str) -> Option<Value> {
        if let Some(overrides) = self.monitor_overrides.get(mon) {
            if let Some(value) = overrides.get(name) {
                return Some(value.clone());
            }
        }
        self.view.get(name).cloned()
    }

    #[must_use]
    pub fn get_str(&self, name: &str, mon: &str) -> String {
        match self.get(name, mon) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    #[must_use]
    pub fn get_bool(&self, name: &str, mon: &str, default: bool) -> bool {
        coerce_to_bool(self.get(name, mon).as_ref(), default)
    }

    #[must_use]
    pub fn get_float(&self, name: &str, mon: &str, default: f64) -> f64 {
        match self.get(name, mon) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    #[must_use]
    pub fn get_str_list(&self, name: &str, mon: &str) -> Vec<String> {
        match self.get(name, mon) {
            Some(Value::String(s)) if !s.is_empty() => vec![s],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A scratchpad: configuration plus live client state.
pub struct Scratch {
    pub uid: String,
    pub conf: ScratchConfig,
    pub client_info: Option<ClientInfo>,
    pub visible: bool,
    /// Monitor the scratchpad was last shown on.
    pub monitor: String,
    pub pid: i64,
    /// Auxiliary window addresses (full, `0x`-prefixed), never containing
    /// the primary.
    pub extra_addr: HashSet<String>,
    pub excluded_scratches: Vec<String>,
    pub meta: MetaInfo,
    match_rule: Option<MatchRule>,
}

impl Scratch {
    #[must_use]
    pub fn new(
        uid: &str,
        full_config: &serde_json::Map<String, Value>,
        version: VersionInfo,
    ) -> Self {
        let mut scratch = Self {
            uid: uid.to_string(),
            conf: ScratchConfig::default(),
            client_info: None,
            visible: false,
            monitor: String::new(),
            pid: -1,
            extra_addr: HashSet::new(),
            excluded_scratches: Vec::new(),
            meta: MetaInfo::default(),
            match_rule: None,
        };
        scratch.set_config(full_config, version);
        scratch
    }

    /// Build the effective options (`use` inheritance + constraints) and
    /// precompile the match rule.
    pub fn set_config(
        &mut self,
        full_config: &serde_json::Map<String, Value>,
        version: VersionInfo,
    ) {
        let own = full_config
            .get(&self.uid)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut opts = serde_json::Map::new();
        let inherits: Vec<String> = match own.get("use") {
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        for source in inherits {
            match full_config.get(&source).and_then(Value::as_object) {
                Some(base) => opts.extend(base.clone()),
                None => error!(
                    "Scratchpad {} tried to use {source}, but it doesn't exist",
                    self.uid
                ),
            }
        }
        opts.extend(own);

        // Constraints between options.
        if coerce_to_bool(opts.get("preserve_aspect"), false) {
            opts.insert("lazy".into(), Value::Bool(true));
        }
        let have_command = opts
            .get("command")
            .and_then(Value::as_str)
            .is_some_and(|c| !c.is_empty());
        if !have_command {
            opts.insert("match_by".into(), Value::from("class"));
        }
        if !coerce_to_bool(opts.get("process_tracking"), true) {
            opts.insert("lazy".into(), Value::Bool(true));
            if !opts.contains_key("match_by") {
                opts.insert("match_by".into(), Value::from("class"));
            }
        }
        if version < VersionInfo::new(0, 39, 0) {
            opts.insert("allow_special_workspaces".into(), Value::Bool(false));
        }

        let view = ConfigView::new(
            &format!("scratchpads.{}", self.uid),
            Value::Object(opts),
            Some(&SCRATCHPAD_SCHEMA),
        );
        self.conf = ScratchConfig::new(view);

        let (match_by, _) = self.match_props("");
        self.match_rule = if match_by == "pid" {
            None
        } else {
            Some(MatchRule::parse(&self.conf.get_str(&match_by, "")))
        };
    }

    #[must_use]
    pub fn have_command(&self, mon: &str) -> bool {
        !self.conf.get_str("command", mon).is_empty()
    }

    /// Full client address (`0x…`), empty when no client is known.
    #[must_use]
    pub fn full_address(&self) -> String {
        self.client_info
            .as_ref()
            .map(|c| c.address.clone())
            .unwrap_or_default()
    }

    /// Address without the `0x` prefix, as used by the address index.
    #[must_use]
    pub fn short_address(&self) -> String {
        let full = self.full_address();
        full.strip_prefix("0x").unwrap_or(&full).to_string()
    }

    /// Whether `addr` (full form) is the primary or an auxiliary window.
    #[must_use]
    pub fn have_address(&self, addr: &str) -> bool {
        !addr.is_empty() && (addr == self.full_address() || self.extra_addr.contains(addr))
    }

    /// `(match_by, value)`; the value for pid matching is the stored pid.
    #[must_use]
    pub fn match_props(&self, mon: &str) -> (String, String) {
        let match_by = {
            let v = self.conf.get_str("match_by", mon);
            if v.is_empty() { "pid".to_string() } else { v }
        };
        let value = if match_by == "pid" {
            self.pid.to_string()
        } else {
            self.conf.get_str(&match_by, mon)
        };
        (match_by, value)
    }

    #[must_use]
    pub fn match_rule(&self) -> Option<&MatchRule> {
        self.match_rule.as_ref()
    }

    /// Whether a client matches this scratchpad's matching rule.
    #[must_use]
    pub fn matches_client(&self, client: &ClientInfo) -> bool {
        let (match_by, _) = self.match_props("");
        if match_by == "pid" {
            self.pid > 0 && client.pid == self.pid
        } else {
            self.match_rule().is_some_and(|rule| {
                client.prop(&match_by).is_some_and(|v| rule.matches(v))
            })
        }
    }

    /// Find the client this scratchpad matches in a client list.
    #[must_use]
    pub fn find_client<'a>(&self, clients: &'a [ClientInfo]) -> Option<&'a ClientInfo> {
        clients.iter().find(|c| self.matches_client(c))
    }

    /// Forced monitor name, when configured and currently connected.
    #[must_use]
    pub fn forced_monitor(&self, monitors: &[String], mon: &str) -> Option<String> {
        let forced = self.conf.get_str("force_monitor", mon);
        if !forced.is_empty() && monitors.contains(&forced) {
            Some(forced)
        } else {
            None
        }
    }

    /// Lowercased animation type, or empty when disabled.
    #[must_use]
    pub fn animation_type(&self, mon: &str) -> String {
        self.conf.get_str("animation", mon).to_lowercase()
    }

    /// Clear the object for a fresh process.
    pub fn reset(&mut self, pid: i64) {
        self.pid = pid;
        self.visible = false;
        self.client_info = None;
        self.meta.initialized = false;
    }

    /// Workspace change hook: pinned scratchpads follow the workspace.
    pub fn on_workspace_changed(&mut self, name: &str) {
        if self.conf.get_bool("pinned", "", true) {
            self.meta.space_identifier.0 = name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_config(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn version() -> VersionInfo {
        VersionInfo::new(0, 48, 0)
    }

    #[test]
    fn test_schema_defaults_apply() {
        let config = full_config(json!({"term": {"command": "kitty"}}));
        let scratch = Scratch::new("term", &config, version());
        assert_eq!(scratch.conf.get_str("size", ""), "80% 80%");
        assert!(scratch.conf.get_bool("lazy", "", false));
        assert_eq!(scratch.conf.get_str("match_by", ""), "pid");
    }

    #[test]
    fn test_use_inheritance() {
        let config = full_config(json!({
            "base": {"size": "30% 30%", "animation": "fromBottom"},
            "term": {"command": "kitty", "use": "base", "animation": "fromTop"},
        }));
        let scratch = Scratch::new("term", &config, version());
        assert_eq!(scratch.conf.get_str("size", ""), "30% 30%");
        // Own values win over inherited ones.
        assert_eq!(scratch.conf.get_str("animation", ""), "fromTop");
    }

    #[test]
    fn test_unmanaged_forces_class_matching() {
        let config = full_config(json!({"music": {"class": "Spotify"}}));
        let scratch = Scratch::new("music", &config, version());
        assert_eq!(scratch.match_props("").0, "class");
        assert!(scratch.match_rule().is_some());
    }

    #[test]
    fn test_no_process_tracking_forces_lazy() {
        let config = full_config(json!({
            "web": {"command": "firefox", "class": "firefox", "process_tracking": false},
        }));
        let scratch = Scratch::new("web", &config, version());
        assert!(scratch.conf.get_bool("lazy", "", false));
        assert_eq!(scratch.match_props("").0, "class");
    }

    #[test]
    fn test_old_compositor_disables_special_workspaces() {
        let config = full_config(json!({"term": {"command": "kitty"}}));
        let scratch = Scratch::new("term", &config, VersionInfo::new(0, 38, 0));
        assert!(!scratch.conf.get_bool("allow_special_workspaces", "", true));
    }

    #[test]
    fn test_monitor_overrides() {
        let config = full_config(json!({
            "term": {
                "command": "kitty",
                "size": "80% 80%",
                "monitor": {"eDP-1": {"size": "100% 100%"}},
            },
        }));
        let scratch = Scratch::new("term", &config, version());
        assert_eq!(scratch.conf.get_str("size", "eDP-1"), "100% 100%");
        assert_eq!(scratch.conf.get_str("size", "DP-1"), "80% 80%");
    }

    #[test]
    fn test_have_address() {
        let config = full_config(json!({"term": {"command": "kitty"}}));
        let mut scratch = Scratch::new("term", &config, version());
        scratch.client_info = Some(ClientInfo {
            address: "0xabc123def456".into(),
            ..ClientInfo::default()
        });
        scratch.extra_addr.insert("0x999888777666".into());

        assert!(scratch.have_address("0xabc123def456"));
        assert!(scratch.have_address("0x999888777666"));
        assert!(!scratch.have_address("0x000000000001"));
        assert!(!scratch.have_address(""));
    }

    #[test]
    fn test_match_by_pid_uses_stored_pid() {
        let config = full_config(json!({"term": {"command": "kitty"}}));
        let mut scratch = Scratch::new("term", &config, version());
        scratch.pid = 4242;
        let clients = vec![ClientInfo {
            address: "0x1".into(),
            pid: 4242,
            ..ClientInfo::default()
        }];
        assert!(scratch.find_client(&clients).is_some());
    }

    #[test]
    fn test_reset_clears_initialized() {
        let config = full_config(json!({"term": {"command": "kitty"}}));
        let mut scratch = Scratch::new("term", &config, version());
        scratch.meta.initialized = true;
        scratch.visible = true;
        scratch.reset(99);
        assert!(!scratch.meta.initialized);
        assert!(!scratch.visible);
        assert_eq!(scratch.pid, 99);
    }
}
