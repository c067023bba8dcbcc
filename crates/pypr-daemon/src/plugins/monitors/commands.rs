//! Backend command builders for applying a monitor layout.

use pypr_types::MonitorInfo;
use serde_json::{Value, json};

/// Hyprland `keyword monitor` line for one monitor.
#[must_use]
pub fn build_hyprland_command(
    mon: &MonitorInfo,
    config: Option<&serde_json::Map<String, Value>>,
) -> String {
    let resolution = config
        .and_then(|c| c.get("resolution"))
        .map_or_else(
            || format!("{}x{}", mon.width, mon.height),
            |res| match res {
                Value::String(s) => s.clone(),
                Value::Array(items) if items.len() >= 2 => {
                    format!(
                        "{}x{}",
                        items[0].as_i64().unwrap_or(0),
                        items[1].as_i64().unwrap_or(0)
                    )
                }
                _ => format!("{}x{}", mon.width, mon.height),
            },
        );
    let rate = config
        .and_then(|c| c.get("rate"))
        .and_then(Value::as_f64)
        .unwrap_or(mon.refresh_rate);
    let scale = config
        .and_then(|c| c.get("scale"))
        .and_then(Value::as_f64)
        .unwrap_or(mon.scale);
    let transform = config
        .and_then(|c| c.get("transform"))
        .and_then(Value::as_i64)
        .map_or(mon.transform, |t| t as i32);

    let mut command = format!(
        "monitor {},{resolution}@{rate},{}x{},{scale}",
        mon.name, mon.x, mon.y
    );
    if transform != 0 {
        command.push_str(&format!(",transform,{transform}"));
    }
    command
}

#[must_use]
pub fn build_niri_position_action(name: &str, x: i32, y: i32) -> Value {
    json!({"Output": {"output": name, "action": {"Position": {"position": {"x": x, "y": y}}}}})
}

#[must_use]
pub fn build_niri_scale_action(name: &str, scale: f64) -> Value {
    json!({"Output": {"output": name, "action": {"Scale": {"scale": scale}}}})
}

#[must_use]
pub fn build_niri_transform_action(name: &str, transform: i64) -> Value {
    json!({"Output": {"output": name, "action": {"Transform": {"transform": transform}}}})
}

#[must_use]
pub fn build_niri_disable_action(name: &str) -> Value {
    json!({"Output": {"output": name, "action": "Off"}})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MonitorInfo {
        MonitorInfo {
            name: "DP-1".into(),
            width: 1920,
            height: 1080,
            refresh_rate: 60.0,
            x: 1920,
            y: 0,
            scale: 1.0,
            ..MonitorInfo::default()
        }
    }

    #[test]
    fn test_hyprland_command_defaults() {
        let cmd = build_hyprland_command(&monitor(), None);
        assert_eq!(cmd, "monitor DP-1,1920x1080@60,1920x0,1");
    }

    #[test]
    fn test_hyprland_command_with_overrides() {
        let cfg = serde_json::json!({
            "resolution": "2560x1440",
            "rate": 144,
            "scale": 1.25,
            "transform": 1,
        });
        let cmd = build_hyprland_command(&monitor(), cfg.as_object());
        assert_eq!(cmd, "monitor DP-1,2560x1440@144,1920x0,1.25,transform,1");
    }

    #[test]
    fn test_niri_actions_shape() {
        let action = build_niri_position_action("DP-1", 100, 0);
        assert_eq!(action["Output"]["output"], "DP-1");
        assert_eq!(action["Output"]["action"]["Position"]["position"]["x"], 100);
        let off = build_niri_disable_action("DP-1");
        assert_eq!(off["Output"]["action"], "Off");
    }
}
