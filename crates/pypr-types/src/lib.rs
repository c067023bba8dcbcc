//! Shared data model for pypr components.
//!
//! These types mirror the structures exchanged with the compositor
//! (Hyprland JSON, Niri IPC mapped onto the same shape) plus the small
//! amount of protocol shared between the daemon and the control client.

use serde::{Deserialize, Deserializer, Serialize};

/// Response line prefix for a successful command.
pub const RESPONSE_OK: &str = "OK";
/// Response line prefix for a failed command.
pub const RESPONSE_ERROR: &str = "ERROR";

/// Shortest event payload accepted as a window address (hex digits, no `0x`).
pub const MIN_EVENT_ADDR_LEN: usize = 10;

/// Normalize an `activewindowv2`-style payload into a full window address.
///
/// Returns an empty string when the payload is empty or suspiciously short,
/// so a stored address is always either `""` or `0x`-prefixed with at least
/// 12 characters.
#[must_use]
pub fn normalize_address(payload: &str) -> String {
    if payload.len() < MIN_EVENT_ADDR_LEN {
        String::new()
    } else {
        format!("0x{payload}")
    }
}

/// Detected (or overridden) desktop environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Hyprland,
    Niri,
    Wayland,
    Xorg,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Hyprland => "hyprland",
            Environment::Niri => "niri",
            Environment::Wayland => "wayland",
            Environment::Xorg => "xorg",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hyprland" => Ok(Environment::Hyprland),
            "niri" => Ok(Environment::Niri),
            "wayland" => Ok(Environment::Wayland),
            "xorg" | "x11" => Ok(Environment::Xorg),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Workspace identifier as reported by the compositor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Hyprland reports `fullscreen` as a bool on old versions and as a mode
/// integer on newer ones.
fn de_flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
    }

    Ok(match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => b,
        BoolOrInt::Int(i) => i != 0,
    })
}

/// A compositor window record.
///
/// Every field a non-Hyprland backend may omit carries a default so the
/// Niri/fallback mappings deserialize into the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub mapped: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub at: (i32, i32),
    #[serde(default)]
    pub size: (i32, i32),
    #[serde(default)]
    pub workspace: WorkspaceRef,
    #[serde(default)]
    pub floating: bool,
    #[serde(default = "default_monitor_id")]
    pub monitor: i64,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "initialClass")]
    pub initial_class: String,
    #[serde(default, rename = "initialTitle")]
    pub initial_title: String,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub xwayland: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, deserialize_with = "de_flexible_bool")]
    pub fullscreen: bool,
    #[serde(default)]
    pub grouped: Vec<String>,
    #[serde(default, rename = "focusHistoryID")]
    pub focus_history_id: i64,
}

fn default_monitor_id() -> i64 {
    -1
}

impl ClientInfo {
    /// Value of a match property by name (`class`, `title`, …).
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&str> {
        match name {
            "address" => Some(&self.address),
            "class" => Some(&self.class),
            "title" => Some(&self.title),
            "initialClass" => Some(&self.initial_class),
            "initialTitle" => Some(&self.initial_title),
            _ => None,
        }
    }
}

fn default_scale() -> f64 {
    1.0
}

fn default_refresh_rate() -> f64 {
    60.0
}

fn default_true() -> bool {
    true
}

/// A compositor output record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default = "default_refresh_rate", rename = "refreshRate")]
    pub refresh_rate: f64,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default, rename = "activeWorkspace")]
    pub active_workspace: WorkspaceRef,
    #[serde(default, rename = "specialWorkspace")]
    pub special_workspace: WorkspaceRef,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub transform: i32,
    #[serde(default)]
    pub focused: bool,
    #[serde(default = "default_true", rename = "dpmsStatus")]
    pub dpms_status: bool,
    #[serde(default)]
    pub disabled: bool,
    /// Runtime flag set by the layout resolver, never part of the wire data.
    #[serde(skip)]
    pub to_disable: bool,
}

impl Default for MonitorInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            width: 0,
            height: 0,
            refresh_rate: default_refresh_rate(),
            x: 0,
            y: 0,
            active_workspace: WorkspaceRef::default(),
            special_workspace: WorkspaceRef::default(),
            scale: 1.0,
            transform: 0,
            focused: false,
            dpms_status: true,
            disabled: false,
            to_disable: false,
        }
    }
}

impl MonitorInfo {
    /// Odd transforms rotate 90/270 degrees, swapping width and height for
    /// layout purposes.
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        self.transform % 2 == 1
    }
}

/// A compositor version triple, ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionInfo {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version tag like `v0.40.0` or `0.40.0-127-g4e42107d`.
    ///
    /// When the tag carries a commit suffix the running compositor is ahead
    /// of the tag, so the patch component is bumped by one.
    ///
    /// # Errors
    ///
    /// Returns an error when no leading `major.minor` pair can be parsed.
    pub fn parse_tag(tag: &str) -> Result<Self, String> {
        let tag = tag.strip_prefix('v').unwrap_or(tag);
        let (version_part, ahead) = match tag.split_once('-') {
            Some((v, _rest)) => (v, true),
            None => (tag, false),
        };

        let mut parts = version_part.split('.').map(str::parse::<u32>);
        let major = parts
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| format!("unparsable version tag: {tag}"))?;
        let minor = parts
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| format!("unparsable version tag: {tag}"))?;
        let mut patch = parts.next().and_then(Result::ok).unwrap_or(0);
        if ahead {
            patch += 1;
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Exit codes used by the `pypr` control client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    UsageError = 1,
    EnvError = 2,
    ConnectionError = 3,
    CommandError = 4,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HYPRLAND_CLIENT: &str = r#"{
        "address": "0x55dd2f5ab330",
        "mapped": true,
        "hidden": false,
        "at": [60, 1147],
        "size": [1800, 914],
        "workspace": {"id": -98, "name": "special:scratch_term"},
        "floating": true,
        "monitor": 0,
        "class": "kitty-dropterm",
        "title": "zsh",
        "initialClass": "kitty-dropterm",
        "initialTitle": "kitty",
        "pid": 24567,
        "xwayland": false,
        "pinned": false,
        "fullscreen": false,
        "grouped": [],
        "swallowing": "0x0",
        "focusHistoryID": 3
    }"#;

    const HYPRLAND_MONITOR: &str = r#"{
        "id": 0,
        "name": "DP-1",
        "description": "Dell Inc. DELL U2415 ABC123",
        "width": 1920,
        "height": 1200,
        "refreshRate": 59.95,
        "x": 0,
        "y": 0,
        "activeWorkspace": {"id": 2, "name": "2"},
        "specialWorkspace": {"id": 0, "name": ""},
        "scale": 1.0,
        "transform": 0,
        "focused": true,
        "dpmsStatus": true,
        "vrr": false,
        "disabled": false
    }"#;

    #[test]
    fn test_client_info_deserializes_hyprland_json() {
        let client: ClientInfo = serde_json::from_str(HYPRLAND_CLIENT).unwrap();
        assert_eq!(client.address, "0x55dd2f5ab330");
        assert_eq!(client.at, (60, 1147));
        assert_eq!(client.size, (1800, 914));
        assert_eq!(client.workspace.name, "special:scratch_term");
        assert_eq!(client.class, "kitty-dropterm");
        assert_eq!(client.initial_class, "kitty-dropterm");
        assert_eq!(client.pid, 24567);
        assert!(!client.fullscreen);
    }

    #[test]
    fn test_client_info_fullscreen_accepts_integer() {
        let client: ClientInfo =
            serde_json::from_str(r#"{"address": "0x1", "fullscreen": 2}"#).unwrap();
        assert!(client.fullscreen);
        let client: ClientInfo =
            serde_json::from_str(r#"{"address": "0x1", "fullscreen": 0}"#).unwrap();
        assert!(!client.fullscreen);
    }

    #[test]
    fn test_client_info_missing_fields_use_defaults() {
        let client: ClientInfo = serde_json::from_str(r#"{"address": "0x42"}"#).unwrap();
        assert_eq!(client.monitor, -1);
        assert!(client.grouped.is_empty());
        assert_eq!(client.workspace.id, 0);
    }

    #[test]
    fn test_client_prop_lookup() {
        let client: ClientInfo = serde_json::from_str(HYPRLAND_CLIENT).unwrap();
        assert_eq!(client.prop("class"), Some("kitty-dropterm"));
        assert_eq!(client.prop("initialTitle"), Some("kitty"));
        assert_eq!(client.prop("nonsense"), None);
    }

    #[test]
    fn test_monitor_info_deserializes_hyprland_json() {
        let mon: MonitorInfo = serde_json::from_str(HYPRLAND_MONITOR).unwrap();
        assert_eq!(mon.name, "DP-1");
        assert_eq!(mon.width, 1920);
        assert!((mon.refresh_rate - 59.95).abs() < f64::EPSILON);
        assert_eq!(mon.active_workspace.name, "2");
        assert!(mon.focused);
        assert!(!mon.to_disable);
    }

    #[test]
    fn test_monitor_rotation() {
        let mut mon = MonitorInfo::default();
        for transform in 0..8 {
            mon.transform = transform;
            assert_eq!(mon.is_rotated(), transform % 2 == 1);
        }
    }

    #[test]
    fn test_version_parse_plain() {
        assert_eq!(
            VersionInfo::parse_tag("v0.40.0").unwrap(),
            VersionInfo::new(0, 40, 0)
        );
        assert_eq!(
            VersionInfo::parse_tag("0.39.1").unwrap(),
            VersionInfo::new(0, 39, 1)
        );
    }

    #[test]
    fn test_version_parse_git_tag_bumps_patch() {
        assert_eq!(
            VersionInfo::parse_tag("v0.40.0-127-g4e42107d").unwrap(),
            VersionInfo::new(0, 40, 1)
        );
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        assert!(VersionInfo::parse_tag("unknown").is_err());
        assert!(VersionInfo::parse_tag("").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(VersionInfo::new(0, 39, 0) < VersionInfo::new(0, 40, 0));
        assert!(VersionInfo::new(0, 47, 3) > VersionInfo::new(0, 47, 2));
        assert!(VersionInfo::new(1, 0, 0) > VersionInfo::new(0, 99, 99));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("abcdef1234567890"), "0xabcdef1234567890");
        assert_eq!(normalize_address(""), "");
        assert_eq!(normalize_address("1234"), "");
    }

    #[test]
    fn test_environment_roundtrip() {
        for env in [
            Environment::Hyprland,
            Environment::Niri,
            Environment::Wayland,
            Environment::Xorg,
        ] {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
        assert_eq!("x11".parse::<Environment>().unwrap(), Environment::Xorg);
    }

    proptest! {
        /// A normalized address is either empty or `0x`-prefixed with the
        /// documented minimum length.
        #[test]
        fn prop_normalized_address_invariant(payload in "[0-9a-f]{0,20}") {
            let normalized = normalize_address(&payload);
            prop_assert!(
                normalized.is_empty()
                    || (normalized.starts_with("0x") && normalized.len() >= MIN_EVENT_ADDR_LEN + 2)
            );
        }

        /// Version ordering matches lexicographic ordering of the triple.
        #[test]
        fn prop_version_ordering(a in (0u32..5, 0u32..60, 0u32..10), b in (0u32..5, 0u32..60, 0u32..10)) {
            let va = VersionInfo::new(a.0, a.1, a.2);
            let vb = VersionInfo::new(b.0, b.1, b.2);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
