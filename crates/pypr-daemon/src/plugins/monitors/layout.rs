//! Relative monitor placement: dependency graph and coordinate
//! propagation.

use std::collections::{HashMap, VecDeque};

use pypr_types::MonitorInfo;
use serde_json::Value;

/// Static monitor properties carried in placement sections alongside the
/// directional rules.
pub const MONITOR_PROPS: &[&str] = &["resolution", "rate", "scale", "transform"];

pub type PlacementConfig = HashMap<String, serde_json::Map<String, Value>>;

/// Layout-effective dimensions of a monitor: configured resolution (or the
/// current mode) divided by scale, swapped for odd transforms.
// Pixel dimensions fit in i32 for any real display
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn get_dims(mon: &MonitorInfo, config: Option<&serde_json::Map<String, Value>>) -> (i32, i32) {
    let scale = config
        .and_then(|c| c.get("scale"))
        .and_then(Value::as_f64)
        .unwrap_or(mon.scale);
    let transform = config
        .and_then(|c| c.get("transform"))
        .and_then(Value::as_i64)
        .map_or(mon.transform, |t| t as i32);

    let mut width = mon.width;
    let mut height = mon.height;
    if let Some(res) = config.and_then(|c| c.get("resolution")) {
        match res {
            Value::String(s) => {
                if let Some((w, h)) = s.split_once('x') {
                    if let (Ok(w), Ok(h)) = (w.trim().parse(), h.trim().parse()) {
                        width = w;
                        height = h;
                    }
                }
            }
            Value::Array(items) if items.len() >= 2 => {
                if let (Some(w), Some(h)) = (items[0].as_i64(), items[1].as_i64()) {
                    width = w as i32;
                    height = h as i32;
                }
            }
            _ => {}
        }
    }

    let width = (f64::from(width) / scale) as i32;
    let height = (f64::from(height) / scale) as i32;
    if transform % 2 == 1 {
        (height, width)
    } else {
        (width, height)
    }
}

fn place_left(ref_rect: (i32, i32, i32, i32), mon_dim: (i32, i32), rule: &str) -> (i32, i32) {
    let (ref_x, ref_y, _ref_w, ref_h) = ref_rect;
    let (mon_w, mon_h) = mon_dim;
    let x = ref_x - mon_w;
    let y = if rule.contains("bottom") {
        ref_y + ref_h - mon_h
    } else if rule.contains("center") || rule.contains("middle") {
        ref_y + (ref_h - mon_h) / 2
    } else {
        ref_y
    };
    (x, y)
}

fn place_right(ref_rect: (i32, i32, i32, i32), mon_dim: (i32, i32), rule: &str) -> (i32, i32) {
    let (ref_x, ref_y, ref_w, ref_h) = ref_rect;
    let (_mon_w, mon_h) = mon_dim;
    let x = ref_x + ref_w;
    let y = if rule.contains("bottom") {
        ref_y + ref_h - mon_h
    } else if rule.contains("center") || rule.contains("middle") {
        ref_y + (ref_h - mon_h) / 2
    } else {
        ref_y
    };
    (x, y)
}

fn place_top(ref_rect: (i32, i32, i32, i32), mon_dim: (i32, i32), rule: &str) -> (i32, i32) {
    let (ref_x, ref_y, ref_w, _ref_h) = ref_rect;
    let (mon_w, mon_h) = mon_dim;
    let y = ref_y - mon_h;
    let x = if rule.contains("right") {
        ref_x + ref_w - mon_w
    } else if rule.contains("center") || rule.contains("middle") {
        ref_x + (ref_w - mon_w) / 2
    } else {
        ref_x
    };
    (x, y)
}

fn place_bottom(ref_rect: (i32, i32, i32, i32), mon_dim: (i32, i32), rule: &str) -> (i32, i32) {
    let (ref_x, ref_y, ref_w, ref_h) = ref_rect;
    let (mon_w, _mon_h) = mon_dim;
    let y = ref_y + ref_h;
    let x = if rule.contains("right") {
        ref_x + ref_w - mon_w
    } else if rule.contains("center") || rule.contains("middle") {
        ref_x + (ref_w - mon_w) / 2
    } else {
        ref_x
    };
    (x, y)
}

/// Position of `mon` relative to `ref_mon` for a normalized rule.
#[must_use]
pub fn compute_xy(
    ref_mon: &MonitorInfo,
    mon: &MonitorInfo,
    ref_pos: (i32, i32),
    rule: &str,
    ref_config: Option<&serde_json::Map<String, Value>>,
    mon_config: Option<&serde_json::Map<String, Value>>,
) -> (i32, i32) {
    let (ref_w, ref_h) = get_dims(ref_mon, ref_config);
    let mon_dim = get_dims(mon, mon_config);
    let rule = rule.to_lowercase().replace(['_', '-'], "");
    let rect = (ref_pos.0, ref_pos.1, ref_w, ref_h);

    if rule.contains("left") {
        place_left(rect, mon_dim, &rule)
    } else if rule.contains("right") {
        place_right(rect, mon_dim, &rule)
    } else if rule.contains("top") {
        place_top(rect, mon_dim, &rule)
    } else if rule.contains("bottom") {
        place_bottom(rect, mon_dim, &rule)
    } else {
        ref_pos
    }
}

/// Placement edges: reference monitor -> list of `(subject, rule)`.
pub type PlacementGraph = HashMap<String, Vec<(String, String)>>;

/// Build the dependency graph from resolved placement config.
///
/// Rules with several targets use the first one; the remainder are
/// reported in the third return value for a design-time note.
#[must_use]
pub fn build_graph(
    config: &PlacementConfig,
    monitors_by_name: &HashMap<String, MonitorInfo>,
) -> (
    PlacementGraph,
    HashMap<String, usize>,
    Vec<(String, String, Vec<String>)>,
) {
    let mut tree: PlacementGraph = HashMap::new();
    let mut in_degree: HashMap<String, usize> = monitors_by_name
        .keys()
        .map(|name| (name.clone(), 0))
        .collect();
    let mut multi_target_info = Vec::new();

    for (subject, rules) in config {
        if !monitors_by_name.contains_key(subject) {
            continue;
        }
        for (rule_key, rule_val) in rules {
            if MONITOR_PROPS.contains(&rule_key.as_str()) || rule_key == "disables" {
                continue;
            }
            let targets: Vec<String> = match rule_val {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => continue,
            };
            let Some(reference) = targets.first().cloned() else {
                continue;
            };
            if targets.len() > 1 {
                multi_target_info.push((subject.clone(), rule_key.clone(), targets));
            }
            if !monitors_by_name.contains_key(&reference) {
                continue;
            }
            tree.entry(reference)
                .or_default()
                .push((subject.clone(), rule_key.clone()));
            *in_degree.entry(subject.clone()).or_insert(0) += 1;
        }
    }

    (tree, in_degree, multi_target_info)
}

/// Kahn propagation. Monitors without placement rules become anchors at
/// their current coordinates. Returns the computed positions and the list
/// of monitors left unprocessed (which indicates a cycle).
#[must_use]
pub fn compute_positions(
    monitors_by_name: &HashMap<String, MonitorInfo>,
    tree: &PlacementGraph,
    in_degree: &HashMap<String, usize>,
    config: &PlacementConfig,
) -> (HashMap<String, (i32, i32)>, Vec<String>) {
    let mut positions: HashMap<String, (i32, i32)> = HashMap::new();
    let mut degree = in_degree.clone();
    let mut queue: VecDeque<String> = VecDeque::new();

    let mut anchors: Vec<&String> = monitors_by_name
        .keys()
        .filter(|name| degree.get(*name).copied().unwrap_or(0) == 0)
        .collect();
    anchors.sort();
    for name in anchors {
        let mon = &monitors_by_name[name];
        positions.insert(name.clone(), (mon.x, mon.y));
        queue.push_back(name.clone());
    }

    while let Some(reference) = queue.pop_front() {
        let ref_pos = positions[&reference];
        let Some(dependents) = tree.get(&reference) else {
            continue;
        };
        for (subject, rule) in dependents {
            let Some(subject_mon) = monitors_by_name.get(subject) else {
                continue;
            };
            let position = compute_xy(
                &monitors_by_name[&reference],
                subject_mon,
                ref_pos,
                rule,
                config.get(&reference),
                config.get(subject),
            );
            positions.insert(subject.clone(), position);
            if let Some(d) = degree.get_mut(subject) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    queue.push_back(subject.clone());
                }
            }
        }
    }

    let mut unprocessed: Vec<String> = monitors_by_name
        .keys()
        .filter(|name| !positions.contains_key(*name))
        .cloned()
        .collect();
    unprocessed.sort();
    (positions, unprocessed)
}

/// Human-readable walk of the rules among unprocessed monitors, for the
/// cycle diagnostic.
#[must_use]
pub fn find_cycle_path(config: &PlacementConfig, unprocessed: &[String]) -> String {
    let mut segments = Vec::new();
    for name in unprocessed {
        let Some(rules) = config.get(name) else {
            continue;
        };
        for (rule_key, rule_val) in rules {
            if MONITOR_PROPS.contains(&rule_key.as_str()) || rule_key == "disables" {
                continue;
            }
            let target = match rule_val {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                _ => continue,
            };
            if unprocessed.contains(&target) {
                segments.push(format!("{name} {rule_key} {target}"));
            }
        }
    }
    segments.join(", ")
}

/// Translate so every coordinate is non-negative.
#[must_use]
pub fn normalize_positions(
    positions: &HashMap<String, (i32, i32)>,
) -> HashMap<String, (i32, i32)> {
    let min_x = positions.values().map(|p| p.0).min().unwrap_or(0);
    let min_y = positions.values().map(|p| p.1).min().unwrap_or(0);
    positions
        .iter()
        .map(|(name, (x, y))| (name.clone(), (x - min_x, y - min_y)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitor(name: &str, width: i32, height: i32, x: i32, y: i32) -> MonitorInfo {
        MonitorInfo {
            name: name.into(),
            width,
            height,
            x,
            y,
            scale: 1.0,
            ..MonitorInfo::default()
        }
    }

    fn config_of(value: Value) -> PlacementConfig {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_object().unwrap().clone()))
            .collect()
    }

    fn by_name(monitors: Vec<MonitorInfo>) -> HashMap<String, MonitorInfo> {
        monitors.into_iter().map(|m| (m.name.clone(), m)).collect()
    }

    #[test]
    fn test_get_dims_scale() {
        let mut mon = monitor("DP-1", 3840, 2160, 0, 0);
        mon.scale = 2.0;
        assert_eq!(get_dims(&mon, None), (1920, 1080));
    }

    #[test]
    fn test_get_dims_transform_swaps() {
        let mut mon = monitor("DP-1", 1920, 1080, 0, 0);
        mon.transform = 1;
        assert_eq!(get_dims(&mon, None), (1080, 1920));
        mon.transform = 3;
        assert_eq!(get_dims(&mon, None), (1080, 1920));
        mon.transform = 2;
        assert_eq!(get_dims(&mon, None), (1920, 1080));
    }

    #[test]
    fn test_get_dims_resolution_override() {
        let mon = monitor("DP-1", 1920, 1080, 0, 0);
        let cfg = json!({"resolution": "2560x1440"});
        assert_eq!(get_dims(&mon, cfg.as_object()), (2560, 1440));
        let cfg = json!({"resolution": [1280, 720]});
        assert_eq!(get_dims(&mon, cfg.as_object()), (1280, 720));
    }

    #[test]
    fn test_compute_xy_sides() {
        let reference = monitor("A", 1920, 1080, 0, 0);
        let subject = monitor("B", 1280, 1024, 0, 0);

        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "leftOf", None, None),
            (-1280, 0)
        );
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "rightOf", None, None),
            (1920, 0)
        );
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "topOf", None, None),
            (0, -1024)
        );
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "bottomOf", None, None),
            (0, 1080)
        );
    }

    #[test]
    fn test_compute_xy_alignment() {
        let reference = monitor("A", 1920, 1080, 0, 0);
        let subject = monitor("B", 1280, 1024, 0, 0);

        // Center on the perpendicular axis.
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "leftCenterOf", None, None),
            (-1280, (1080 - 1024) / 2)
        );
        // Align to the far edge.
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "leftBottomOf", None, None),
            (-1280, 1080 - 1024)
        );
        assert_eq!(
            compute_xy(&reference, &subject, (0, 0), "topRightOf", None, None),
            (1920 - 1280, -1024)
        );
    }

    #[test]
    fn test_chain_layout() {
        // BenQ(1920x1080@0,0), Microstep(3440x1440), Sony(640x480)
        // Sony rightOf Microstep, Microstep rightOf BenQ
        let monitors = by_name(vec![
            monitor("BenQ", 1920, 1080, 0, 0),
            monitor("Microstep", 3440, 1440, 0, 0),
            monitor("Sony", 640, 480, 0, 0),
        ]);
        let config = config_of(json!({
            "Sony": {"rightOf": ["Microstep"]},
            "Microstep": {"rightOf": ["BenQ"]},
        }));

        let (tree, in_degree, multi) = build_graph(&config, &monitors);
        assert!(multi.is_empty());
        let (positions, unprocessed) = compute_positions(&monitors, &tree, &in_degree, &config);

        assert!(unprocessed.is_empty());
        assert_eq!(positions["BenQ"], (0, 0));
        assert_eq!(positions["Microstep"], (1920, 0));
        assert_eq!(positions["Sony"], (1920 + 3440, 0));
    }

    #[test]
    fn test_anchor_keeps_current_coordinates() {
        let monitors = by_name(vec![
            monitor("A", 1920, 1080, 100, 200),
            monitor("B", 1280, 1024, 0, 0),
        ]);
        let config = config_of(json!({"B": {"rightOf": ["A"]}}));
        let (tree, in_degree, _) = build_graph(&config, &monitors);
        let (positions, _) = compute_positions(&monitors, &tree, &in_degree, &config);

        assert_eq!(positions["A"], (100, 200));
        assert_eq!(positions["B"], (100 + 1920, 200));
    }

    #[test]
    fn test_cycle_detected() {
        let monitors = by_name(vec![
            monitor("A", 1920, 1080, 0, 0),
            monitor("B", 1920, 1080, 0, 0),
        ]);
        let config = config_of(json!({
            "A": {"rightOf": ["B"]},
            "B": {"rightOf": ["A"]},
        }));
        let (tree, in_degree, _) = build_graph(&config, &monitors);
        let (positions, unprocessed) = compute_positions(&monitors, &tree, &in_degree, &config);

        assert!(positions.is_empty());
        assert_eq!(unprocessed, vec!["A".to_string(), "B".to_string()]);
        let diagnostic = find_cycle_path(&config, &unprocessed);
        assert!(diagnostic.contains("rightOf"));
    }

    #[test]
    fn test_multi_target_uses_first() {
        let monitors = by_name(vec![
            monitor("A", 1920, 1080, 0, 0),
            monitor("B", 1920, 1080, 0, 0),
            monitor("C", 800, 600, 0, 0),
        ]);
        let config = config_of(json!({"C": {"rightOf": ["A", "B"]}}));
        let (tree, in_degree, multi) = build_graph(&config, &monitors);
        assert_eq!(multi.len(), 1);
        let (positions, _) = compute_positions(&monitors, &tree, &in_degree, &config);
        assert_eq!(positions["C"], (1920, 0));
    }

    #[test]
    fn test_scaled_reference_dimensions() {
        let mut reference = monitor("HiDPI", 3840, 2160, 0, 0);
        reference.scale = 2.0;
        let monitors = by_name(vec![reference, monitor("B", 1920, 1080, 0, 0)]);
        let config = config_of(json!({"B": {"rightOf": ["HiDPI"]}}));
        let (tree, in_degree, _) = build_graph(&config, &monitors);
        let (positions, _) = compute_positions(&monitors, &tree, &in_degree, &config);
        // The reference's layout width is 3840/2 = 1920.
        assert_eq!(positions["B"], (1920, 0));
    }

    #[test]
    fn test_normalize_positions() {
        let positions = HashMap::from([
            ("A".to_string(), (-1280, -100)),
            ("B".to_string(), (0, 0)),
        ]);
        let normalized = normalize_positions(&positions);
        assert_eq!(normalized["A"], (0, 0));
        assert_eq!(normalized["B"], (1280, 100));
        let min_x = normalized.values().map(|p| p.0).min().unwrap();
        let min_y = normalized.values().map(|p| p.1).min().unwrap();
        assert_eq!((min_x, min_y), (0, 0));
    }
}
