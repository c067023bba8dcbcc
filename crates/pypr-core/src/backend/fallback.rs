//! Degraded backends for environments without a supported compositor.
//!
//! Only `get_monitors()` is functional, parsing `wlr-randr` (generic
//! Wayland) or `xrandr --query` (X11) output. Everything else is a no-op
//! logged at debug level; notifications go through `notify-send`.

use std::sync::LazyLock;

use async_trait::async_trait;
use pypr_types::{ClientInfo, Environment, MonitorInfo};
use regex::Regex;
use serde_json::Value;
use tokio::net::UnixStream;
use tracing::{debug, error, warn};

use super::{Backend, NotifyKind, notify_send};
use crate::error::{Error, Result};

/// Map textual transform names (wlr-randr / xrandr) to transform integers.
fn transform_from_name(name: &str) -> i32 {
    match name {
        "90" | "left" => 1,
        "180" | "inverted" => 2,
        "270" | "right" => 3,
        "flipped" => 4,
        "flipped-90" => 5,
        "flipped-180" => 6,
        "flipped-270" => 7,
        _ => 0,
    }
}

fn make_monitor_info(index: usize, name: &str, description: &str) -> MonitorInfo {
    MonitorInfo {
        id: i64::try_from(index).unwrap_or(0),
        name: name.to_string(),
        description: if description.is_empty() {
            name.to_string()
        } else {
            description.to_string()
        },
        focused: index == 0,
        ..MonitorInfo::default()
    }
}

/// Parse `wlr-randr` output into monitor records.
///
/// ```text
/// DP-1 "Dell Inc. DELL U2415 ABC123"
///   Enabled: yes
///   Modes:
///     1920x1200 px, 59.950 Hz (preferred, current)
///   Position: 0,0
///   Transform: normal
///   Scale: 1.000000
/// ```
#[must_use]
pub fn parse_wlr_randr_output(output: &str, include_disabled: bool) -> Vec<MonitorInfo> {
    static HEADER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"^(\S+)\s*(?:"(.+)")?"#).unwrap());
    static POSITION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+),\s*(\d+)").unwrap());
    static MODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+)x(\d+)\s*px,\s*([\d.]+)\s*Hz").unwrap());

    let mut monitors = Vec::new();
    let mut current: Option<MonitorInfo> = None;

    let mut finish = |mon: Option<MonitorInfo>, monitors: &mut Vec<MonitorInfo>| {
        if let Some(m) = mon {
            if m.width == 0 || m.height == 0 {
                debug!("wlr-randr: skipping {} (no active mode)", m.name);
            } else if !m.disabled || include_disabled {
                monitors.push(m);
            }
        }
    };

    for raw_line in output.lines() {
        if !raw_line.starts_with(char::is_whitespace) && !raw_line.trim().is_empty() {
            finish(current.take(), &mut monitors);
            if let Some(caps) = HEADER.captures(raw_line) {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let description = caps.get(2).map_or("", |m| m.as_str());
                current = Some(make_monitor_info(monitors.len(), name, description));
            }
            continue;
        }

        let Some(mon) = current.as_mut() else {
            continue;
        };
        let line = raw_line.trim();

        if let Some(rest) = line.strip_prefix("Enabled:") {
            mon.disabled = !rest.to_lowercase().contains("yes");
        } else if line.starts_with("Position:") {
            if let Some(caps) = POSITION.captures(line) {
                mon.x = caps[1].parse().unwrap_or(0);
                mon.y = caps[2].parse().unwrap_or(0);
            }
        } else if let Some(rest) = line.strip_prefix("Transform:") {
            mon.transform = transform_from_name(rest.trim());
        } else if let Some(rest) = line.strip_prefix("Scale:") {
            mon.scale = rest.trim().parse().unwrap_or(1.0);
        } else if line.to_lowercase().contains("current") {
            if let Some(caps) = MODE.captures(line) {
                mon.width = caps[1].parse().unwrap_or(0);
                mon.height = caps[2].parse().unwrap_or(0);
                mon.refresh_rate = caps[3].parse().unwrap_or(60.0);
            }
        }
    }
    finish(current.take(), &mut monitors);

    monitors
}

/// Parse `xrandr --query` output into monitor records.
///
/// ```text
/// DP-1 connected primary 1920x1080+0+0 left (normal left inverted right) 527mm x 296mm
/// VGA-1 disconnected (normal left inverted right x axis y axis)
/// ```
#[must_use]
pub fn parse_xrandr_output(output: &str, include_disabled: bool) -> Vec<MonitorInfo> {
    static LINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^(\S+)\s+(connected|disconnected)(?:\s+primary)?(?:\s+(\d+)x(\d+)\+(\d+)\+(\d+))?(?:\s+(normal|left|inverted|right))?",
        )
        .unwrap()
    });

    let mut monitors = Vec::new();
    for line in output.lines() {
        let Some(caps) = LINE.captures(line) else {
            continue;
        };
        let connected = &caps[2] == "connected";
        if !connected && !include_disabled {
            continue;
        }
        let width: i32 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        let height: i32 = caps.get(4).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        if (width == 0 || height == 0) && !include_disabled {
            continue;
        }

        let mut mon = make_monitor_info(monitors.len(), &caps[1], "");
        mon.width = width;
        mon.height = height;
        mon.x = caps.get(5).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        mon.y = caps.get(6).map_or(0, |m| m.as_str().parse().unwrap_or(0));
        mon.transform = caps.get(7).map_or(0, |m| transform_from_name(m.as_str()));
        mon.disabled = !connected;
        monitors.push(mon);
    }
    monitors
}

async fn check_command(command: &str) -> bool {
    tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn run_monitor_command(
    command: &str,
    tool_name: &str,
    parser: fn(&str, bool) -> Vec<MonitorInfo>,
    include_disabled: bool,
) -> Result<Vec<MonitorInfo>> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|e| Error::Backend(format!("{tool_name} failed: {e}")))?;

    if !output.status.success() {
        error!("{tool_name} failed: {}", String::from_utf8_lossy(&output.stderr));
        return Ok(Vec::new());
    }

    Ok(parser(&String::from_utf8_lossy(&output.stdout), include_disabled))
}

macro_rules! degraded_backend {
    ($name:ident, $env:expr, $probe:expr, $command:expr, $parser:expr) => {
        #[derive(Default)]
        pub struct $name;

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self
            }

            /// Check whether the required tool is present and functional.
            pub async fn is_available() -> bool {
                check_command($probe).await
            }
        }

        #[async_trait]
        impl Backend for $name {
            fn environment(&self) -> Environment {
                $env
            }

            async fn get_clients(
                &self,
                _mapped: bool,
                _workspace: Option<&str>,
                _workspace_bl: Option<&str>,
            ) -> Result<Vec<ClientInfo>> {
                debug!("get_clients() not supported in fallback backend");
                Ok(Vec::new())
            }

            async fn get_monitors(&self, include_disabled: bool) -> Result<Vec<MonitorInfo>> {
                run_monitor_command($command, stringify!($name), $parser, include_disabled).await
            }

            async fn execute(&self, command: &str, _base: &str, _weak: bool) -> Result<bool> {
                debug!("execute({command}) not supported in fallback backend");
                Ok(false)
            }

            async fn execute_many(&self, commands: &[String], _weak: bool) -> Result<bool> {
                debug!("execute_many({commands:?}) not supported in fallback backend");
                Ok(false)
            }

            async fn execute_json(&self, command: &str) -> Result<Value> {
                debug!("execute_json({command}) not supported in fallback backend");
                Ok(Value::Object(serde_json::Map::new()))
            }

            async fn execute_batch(&self, commands: &[String]) -> Result<()> {
                debug!("execute_batch({commands:?}) not supported in fallback backend");
                Ok(())
            }

            async fn notify(
                &self,
                message: &str,
                duration_ms: u64,
                _kind: NotifyKind,
            ) -> Result<()> {
                notify_send(message, duration_ms).await;
                Ok(())
            }

            fn parse_event(&self, _raw: &str) -> Option<(String, String)> {
                None
            }

            fn supports_events(&self) -> bool {
                false
            }

            async fn open_event_stream(&self) -> Result<UnixStream> {
                warn!("no event stream in degraded mode");
                Err(Error::Backend("no event stream in degraded mode".into()))
            }
        }
    };
}

degraded_backend!(
    WaylandBackend,
    Environment::Wayland,
    "wlr-randr",
    "wlr-randr",
    parse_wlr_randr_output
);

degraded_backend!(
    XorgBackend,
    Environment::Xorg,
    "xrandr --version",
    "xrandr --query",
    parse_xrandr_output
);

#[cfg(test)]
mod tests {
    use super::*;

    const WLR_RANDR_SAMPLE: &str = r#"DP-1 "Dell Inc. DELL U2415 ABC123"
  Enabled: yes
  Modes:
    1920x1200 px, 59.950 Hz (preferred, current)
    1920x1080 px, 60.000 Hz
  Position: 0,0
  Transform: normal
  Scale: 1.000000
HDMI-A-1 "Sony SONY TV 0x01010101"
  Enabled: yes
  Modes:
    3840x2160 px, 59.997 Hz (current)
  Position: 1920,0
  Transform: 90
  Scale: 2.000000
DP-2 "Disconnected thing"
  Enabled: no
  Modes:
"#;

    const XRANDR_SAMPLE: &str = "\
DP-1 connected primary 1920x1080+0+0 left (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+
HDMI-1 connected 2560x1440+1920+0 (normal left inverted right x axis y axis) 597mm x 336mm
   2560x1440     59.95*+
VGA-1 disconnected (normal left inverted right x axis y axis)
";

    #[test]
    fn test_parse_wlr_randr() {
        let monitors = parse_wlr_randr_output(WLR_RANDR_SAMPLE, false);
        assert_eq!(monitors.len(), 2);

        let dp1 = &monitors[0];
        assert_eq!(dp1.name, "DP-1");
        assert_eq!(dp1.description, "Dell Inc. DELL U2415 ABC123");
        assert_eq!((dp1.width, dp1.height), (1920, 1200));
        assert!((dp1.refresh_rate - 59.95).abs() < 0.001);
        assert_eq!(dp1.transform, 0);

        let hdmi = &monitors[1];
        assert_eq!(hdmi.name, "HDMI-A-1");
        assert_eq!((hdmi.x, hdmi.y), (1920, 0));
        assert_eq!(hdmi.transform, 1);
        assert!((hdmi.scale - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_wlr_randr_skips_disabled_without_mode() {
        // Disabled output has no current mode, so it is dropped either way.
        let monitors = parse_wlr_randr_output(WLR_RANDR_SAMPLE, true);
        assert_eq!(monitors.len(), 2);
    }

    #[test]
    fn test_parse_xrandr() {
        let monitors = parse_xrandr_output(XRANDR_SAMPLE, false);
        assert_eq!(monitors.len(), 2);

        let dp1 = &monitors[0];
        assert_eq!(dp1.name, "DP-1");
        assert_eq!((dp1.width, dp1.height), (1920, 1080));
        assert_eq!(dp1.transform, 1);

        let hdmi = &monitors[1];
        assert_eq!(hdmi.name, "HDMI-1");
        assert_eq!((hdmi.x, hdmi.y), (1920, 0));
    }

    #[test]
    fn test_parse_xrandr_include_disabled() {
        let monitors = parse_xrandr_output(XRANDR_SAMPLE, true);
        assert_eq!(monitors.len(), 3);
        assert!(monitors[2].disabled);
        assert_eq!(monitors[2].name, "VGA-1");
    }

    #[test]
    fn test_transform_names() {
        assert_eq!(transform_from_name("normal"), 0);
        assert_eq!(transform_from_name("left"), 1);
        assert_eq!(transform_from_name("90"), 1);
        assert_eq!(transform_from_name("270"), 3);
        assert_eq!(transform_from_name("flipped-270"), 7);
    }
}
