//! Conversion of user-facing size units into pixels.

use pypr_types::MonitorInfo;
use serde_json::Value;

use crate::error::{Error, Result};

/// Convert a single dimension into pixels.
///
/// Plain integers pass through; `"N%"` is taken relative to `ref_value`
/// corrected by the monitor scale; `"Npx"` strips the suffix.
///
/// # Errors
///
/// Returns an error for any other format.
// Pixel dimensions fit in i32 for any real display
#[allow(clippy::cast_possible_truncation)]
pub fn convert_monitor_dimension(
    size: &Value,
    ref_value: i32,
    monitor: &MonitorInfo,
) -> Result<i32> {
    if let Some(n) = size.as_i64() {
        return Ok(i32::try_from(n).unwrap_or(i32::MAX));
    }

    if let Some(s) = size.as_str() {
        if let Some(pct) = s.strip_suffix('%') {
            if let Ok(p) = pct.trim().parse::<f64>() {
                return Ok((f64::from(ref_value) / monitor.scale * p / 100.0) as i32);
            }
        } else if let Some(px) = s.strip_suffix("px") {
            if let Ok(v) = px.trim().parse::<i32>() {
                return Ok(v);
            }
        }
    }

    Err(Error::Backend(format!(
        "Unsupported format: {size} (applied to {ref_value})"
    )))
}

/// Convert a `"X Y"` pair into pixel coordinates relative to a monitor.
///
/// The horizontal reference is the monitor width and the vertical one its
/// height, swapped when the monitor is rotated.
///
/// # Errors
///
/// Returns an error when the string does not contain two convertible parts.
pub fn convert_coords(coords: &str, monitor: &MonitorInfo) -> Result<(i32, i32)> {
    let refs = if monitor.is_rotated() {
        (monitor.height, monitor.width)
    } else {
        (monitor.width, monitor.height)
    };

    let mut parts = coords.split_whitespace();
    let (Some(x_part), Some(y_part)) = (parts.next(), parts.next()) else {
        return Err(Error::Backend(format!("Invalid coordinates: {coords:?}")));
    };

    let x = convert_monitor_dimension(&parse_part(x_part), refs.0, monitor)?;
    let y = convert_monitor_dimension(&parse_part(y_part), refs.1, monitor)?;
    Ok((x, y))
}

fn parse_part(part: &str) -> Value {
    part.parse::<i64>()
        .map_or_else(|_| Value::from(part), Value::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitor(width: i32, height: i32, scale: f64, transform: i32) -> MonitorInfo {
        MonitorInfo {
            name: "DP-1".into(),
            width,
            height,
            scale,
            transform,
            ..MonitorInfo::default()
        }
    }

    #[test]
    fn test_integer_passthrough() {
        let mon = monitor(800, 600, 1.0, 0);
        assert_eq!(convert_monitor_dimension(&json!(42), 800, &mon).unwrap(), 42);
    }

    #[test]
    fn test_percent() {
        let mon = monitor(800, 600, 1.0, 0);
        assert_eq!(
            convert_monitor_dimension(&json!("10%"), 800, &mon).unwrap(),
            80
        );
    }

    #[test]
    fn test_percent_respects_scale() {
        let mon = monitor(3840, 2160, 2.0, 0);
        assert_eq!(
            convert_monitor_dimension(&json!("50%"), 3840, &mon).unwrap(),
            960
        );
    }

    #[test]
    fn test_px_suffix() {
        let mon = monitor(800, 600, 1.0, 0);
        assert_eq!(
            convert_monitor_dimension(&json!("120px"), 800, &mon).unwrap(),
            120
        );
    }

    #[test]
    fn test_bad_format_is_error() {
        let mon = monitor(800, 600, 1.0, 0);
        assert!(convert_monitor_dimension(&json!("12em"), 800, &mon).is_err());
    }

    #[test]
    fn test_convert_coords() {
        let mon = monitor(800, 600, 1.0, 0);
        assert_eq!(convert_coords("10% 20%", &mon).unwrap(), (80, 120));
    }

    #[test]
    fn test_convert_coords_rotated_swaps_references() {
        let mon = monitor(800, 600, 1.0, 1);
        // Rotated: X is measured against height, Y against width.
        assert_eq!(convert_coords("10% 20%", &mon).unwrap(), (60, 160));
    }

    #[test]
    fn test_convert_coords_mixed_units() {
        let mon = monitor(800, 600, 1.0, 0);
        assert_eq!(convert_coords("100px 50%", &mon).unwrap(), (100, 300));
    }
}
