//! Absolute window placement for show animations.

use pypr_core::Result;
use pypr_core::units::convert_monitor_dimension;
use pypr_types::{ClientInfo, MonitorInfo};
use serde_json::Value;

use super::helpers::get_size;

/// Destination coordinates for a show animation.
///
/// Returns `None` for an unknown animation type.
pub fn placement(
    animation_type: &str,
    monitor: &MonitorInfo,
    client: &ClientInfo,
    margin: &Value,
) -> Result<Option<(i32, i32)>> {
    let (mon_width, mon_height) = get_size(monitor);
    let (client_width, client_height) = client.size;
    let mon_x = monitor.x;
    let mon_y = monitor.y;

    Ok(match animation_type {
        "fromtop" => {
            let margin_x = (mon_width - client_width) / 2 + mon_x;
            let corrected = convert_monitor_dimension(margin, mon_height, monitor)?;
            Some((margin_x, mon_y + corrected))
        }
        "frombottom" => {
            let margin_x = (mon_width - client_width) / 2 + mon_x;
            let corrected = convert_monitor_dimension(margin, mon_height, monitor)?;
            Some((margin_x, mon_y + mon_height - client_height - corrected))
        }
        "fromleft" => {
            let margin_y = (mon_height - client_height) / 2 + mon_y;
            let corrected = convert_monitor_dimension(margin, mon_width, monitor)?;
            Some((corrected + mon_x, margin_y))
        }
        "fromright" => {
            let margin_y = (mon_height - client_height) / 2 + mon_y;
            let corrected = convert_monitor_dimension(margin, mon_width, monitor)?;
            Some((mon_width - client_width - corrected + mon_x, margin_y))
        }
        _ => None,
    })
}

/// `movewindowpixel` deltas sliding windows off screen for a hide.
#[must_use]
pub fn slide_action(animation_type: &str, offset: (i32, i32)) -> Option<String> {
    let (off_x, off_y) = offset;
    match animation_type {
        "fromright" => Some(format!("movewindowpixel {off_x} 0")),
        "fromleft" => Some(format!("movewindowpixel {} 0", -off_x)),
        "frombottom" => Some(format!("movewindowpixel 0 {off_y}")),
        "fromtop" => Some(format!("movewindowpixel 0 {}", -off_y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitor() -> MonitorInfo {
        MonitorInfo {
            name: "DP-1".into(),
            width: 1920,
            height: 1080,
            scale: 1.0,
            x: 0,
            y: 0,
            ..MonitorInfo::default()
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            size: (800, 600),
            ..ClientInfo::default()
        }
    }

    #[test]
    fn test_fromtop_centers_horizontally() {
        let pos = placement("fromtop", &monitor(), &client(), &json!(60))
            .unwrap()
            .unwrap();
        assert_eq!(pos, ((1920 - 800) / 2, 60));
    }

    #[test]
    fn test_frombottom() {
        let pos = placement("frombottom", &monitor(), &client(), &json!(60))
            .unwrap()
            .unwrap();
        assert_eq!(pos, (560, 1080 - 600 - 60));
    }

    #[test]
    fn test_fromleft_and_fromright() {
        let left = placement("fromleft", &monitor(), &client(), &json!(0))
            .unwrap()
            .unwrap();
        assert_eq!(left, (0, (1080 - 600) / 2));

        let right = placement("fromright", &monitor(), &client(), &json!(0))
            .unwrap()
            .unwrap();
        assert_eq!(right, (1920 - 800, 240));
    }

    #[test]
    fn test_margin_as_percent() {
        let pos = placement("fromtop", &monitor(), &client(), &json!("10%"))
            .unwrap()
            .unwrap();
        assert_eq!(pos.1, 108);
    }

    #[test]
    fn test_monitor_offset_applied() {
        let mut mon = monitor();
        mon.x = 1920;
        let pos = placement("fromtop", &mon, &client(), &json!(60))
            .unwrap()
            .unwrap();
        assert_eq!(pos.0, 1920 + 560);
    }

    #[test]
    fn test_unknown_animation() {
        let pos = placement("diagonal", &monitor(), &client(), &json!(60)).unwrap();
        assert!(pos.is_none());
    }

    #[test]
    fn test_slide_action() {
        assert_eq!(
            slide_action("fromtop", (100, 200)).unwrap(),
            "movewindowpixel 0 -200"
        );
        assert_eq!(
            slide_action("fromright", (100, 200)).unwrap(),
            "movewindowpixel 100 0"
        );
        assert!(slide_action("nope", (1, 1)).is_none());
    }
}
