//! Monitor pattern matching and placement-config resolution.

use std::collections::HashMap;

use pypr_types::MonitorInfo;
use serde_json::Value;

use super::layout::{MONITOR_PROPS, PlacementConfig};

/// Find a monitor by pattern: exact name first, then description
/// substring. Results are cached per relayout run.
pub fn get_monitor_by_pattern<'a>(
    pattern: &str,
    monitors: &'a [MonitorInfo],
    cache: &mut HashMap<String, String>,
) -> Option<&'a MonitorInfo> {
    if let Some(name) = cache.get(pattern) {
        return monitors.iter().find(|m| &m.name == name);
    }

    let found = monitors
        .iter()
        .find(|m| m.name == pattern)
        .or_else(|| monitors.iter().find(|m| m.description.contains(pattern)));

    if let Some(mon) = found {
        cache.insert(pattern.to_string(), mon.name.clone());
    }
    found
}

/// Resolve every pattern in the placement config against the connected
/// monitors. Unresolved subjects are dropped silently; unresolved rule
/// targets are removed from the target lists.
#[must_use]
pub fn resolve_placement_config(
    placement: &serde_json::Map<String, Value>,
    monitors: &[MonitorInfo],
    cache: &mut HashMap<String, String>,
) -> PlacementConfig {
    let mut resolved: PlacementConfig = HashMap::new();

    for (pattern, rules) in placement {
        let Some(rules) = rules.as_object() else {
            continue;
        };
        let Some(mon) = get_monitor_by_pattern(pattern, monitors, cache) else {
            continue;
        };
        let name = mon.name.clone();
        let mut entry = serde_json::Map::new();

        for (rule_key, rule_val) in rules {
            if MONITOR_PROPS.contains(&rule_key.as_str()) {
                entry.insert(rule_key.clone(), rule_val.clone());
                continue;
            }

            let target_patterns: Vec<String> = match rule_val {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => continue,
            };
            let targets: Vec<Value> = target_patterns
                .iter()
                .filter_map(|p| get_monitor_by_pattern(p, monitors, cache))
                .map(|m| Value::from(m.name.clone()))
                .collect();
            if !targets.is_empty() {
                entry.insert(rule_key.clone(), Value::Array(targets));
            }
        }

        resolved.insert(name, entry);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitors() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo {
                name: "DP-1".into(),
                description: "BNQ BenQ GW2480 X1K02900SL0".into(),
                ..MonitorInfo::default()
            },
            MonitorInfo {
                name: "HDMI-A-1".into(),
                description: "Microstep MSI G24C4 0000000000".into(),
                ..MonitorInfo::default()
            },
        ]
    }

    #[test]
    fn test_pattern_exact_name() {
        let monitors = monitors();
        let mut cache = HashMap::new();
        let found = get_monitor_by_pattern("DP-1", &monitors, &mut cache).unwrap();
        assert_eq!(found.name, "DP-1");
    }

    #[test]
    fn test_pattern_description_substring() {
        let monitors = monitors();
        let mut cache = HashMap::new();
        let found = get_monitor_by_pattern("Microstep", &monitors, &mut cache).unwrap();
        assert_eq!(found.name, "HDMI-A-1");
        // Second lookup comes from the cache.
        let found = get_monitor_by_pattern("Microstep", &monitors, &mut cache).unwrap();
        assert_eq!(found.name, "HDMI-A-1");
    }

    #[test]
    fn test_resolve_placement() {
        let monitors = monitors();
        let mut cache = HashMap::new();
        let placement = json!({
            "Microstep": {"rightOf": "BenQ", "rate": 144},
            "Nonexistent": {"leftOf": "BenQ"},
        });
        let resolved =
            resolve_placement_config(placement.as_object().unwrap(), &monitors, &mut cache);

        // The unresolved subject is dropped silently.
        assert_eq!(resolved.len(), 1);
        let entry = &resolved["HDMI-A-1"];
        assert_eq!(entry["rightOf"], json!(["DP-1"]));
        assert_eq!(entry["rate"], json!(144));
    }

    #[test]
    fn test_resolve_drops_unknown_targets() {
        let monitors = monitors();
        let mut cache = HashMap::new();
        let placement = json!({
            "BenQ": {"rightOf": ["Ghost", "Microstep"]},
        });
        let resolved =
            resolve_placement_config(placement.as_object().unwrap(), &monitors, &mut cache);
        assert_eq!(resolved["DP-1"]["rightOf"], json!(["HDMI-A-1"]));
    }
}
