//! Configuration schema for the monitors plugin.

use std::sync::LazyLock;

use pypr_core::config::{ConfigField, FieldType, Schema};
use serde_json::{Value, json};

use super::layout::MONITOR_PROPS;

const PLACEMENT_DIRECTIONS: &[&str] = &["left", "right", "top", "bottom"];

/// Static monitor properties allowed inside a placement entry.
static MONITOR_PROPS_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        ConfigField::new("scale", FieldType::Float).describe("UI scale factor"),
        ConfigField::union("rate", &[FieldType::Int, FieldType::Float])
            .describe("Refresh rate in Hz"),
        ConfigField::union("resolution", &[FieldType::Str, FieldType::List])
            .describe("Display resolution (e.g., '2560x1440' or [2560, 1440])"),
        ConfigField::new("transform", FieldType::Int)
            .choices((0..8).map(Value::from).collect())
            .describe("Rotation/flip transform"),
        ConfigField::new("disables", FieldType::List)
            .describe("List of monitors to disable when this monitor is connected"),
    ])
});

/// Validator for dynamic placement keys (`leftOf`, `topCenterOf`, …).
fn validate_placement_keys(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(placements) = value.as_object() else {
        return errors;
    };

    for (monitor_pattern, rules) in placements {
        let Some(rules) = rules.as_object() else {
            continue;
        };
        for (key, val) in rules {
            if MONITOR_PROPS.contains(&key.as_str()) || key == "disables" {
                continue;
            }
            let key_lower = key.to_lowercase().replace('_', "");
            if !PLACEMENT_DIRECTIONS
                .iter()
                .any(|d| key_lower.starts_with(d))
            {
                errors.push(format!(
                    "Invalid placement rule '{key}' for '{monitor_pattern}'"
                ));
            } else {
                let valid_value = val.is_string()
                    || val
                        .as_array()
                        .is_some_and(|items| items.iter().all(Value::is_string));
                if !valid_value {
                    errors.push(format!(
                        "Invalid placement value for '{monitor_pattern}.{key}': expected string or list of strings"
                    ));
                }
            }
        }
    }

    errors
}

pub static MONITORS_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        ConfigField::new("startup_relayout", FieldType::Bool)
            .default_value(json!(true))
            .describe("Relayout monitors on startup"),
        ConfigField::new("relayout_on_config_change", FieldType::Bool)
            .default_value(json!(true))
            .describe("Relayout when the compositor config is reloaded"),
        ConfigField::new("new_monitor_delay", FieldType::Float)
            .default_value(json!(1.0))
            .describe("Delay in seconds before handling new monitor"),
        ConfigField::new("unknown", FieldType::Str)
            .default_value(json!(""))
            .describe("Command to run when an unknown monitor is detected"),
        ConfigField::new("placement", FieldType::Dict)
            .required()
            .default_value(json!({}))
            .describe("Monitor placement rules (pattern -> positioning rules)")
            .validator(validate_placement_keys)
            .children(MONITOR_PROPS_SCHEMA.clone(), true),
        ConfigField::new("hotplug_commands", FieldType::Dict)
            .default_value(json!({}))
            .describe("Commands to run when specific monitors are plugged (pattern -> command)"),
        ConfigField::new("hotplug_command", FieldType::Str)
            .default_value(json!(""))
            .describe("Command to run when any monitor is plugged"),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;
    use pypr_core::config::Validator;

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_valid_placement() {
        let config = as_map(json!({
            "placement": {
                "Sony": {"rightOf": "Microstep", "rate": 60},
                "Microstep": {"rightOf": ["BenQ"], "scale": 1.5},
            },
        }));
        let errors = Validator::new(&config, "monitors").validate(&MONITORS_SCHEMA);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_invalid_direction_rejected() {
        let config = as_map(json!({
            "placement": {"Sony": {"besideOf": "Microstep"}},
        }));
        let errors = Validator::new(&config, "monitors").validate(&MONITORS_SCHEMA);
        assert!(
            errors.iter().any(|e| e.contains("Invalid placement rule")),
            "{errors:?}"
        );
    }

    #[test]
    fn test_invalid_target_type_rejected() {
        let config = as_map(json!({
            "placement": {"Sony": {"rightOf": 42}},
        }));
        let errors = Validator::new(&config, "monitors").validate(&MONITORS_SCHEMA);
        assert!(
            errors.iter().any(|e| e.contains("Invalid placement value")),
            "{errors:?}"
        );
    }

    #[test]
    fn test_placement_required() {
        let config = as_map(json!({}));
        let errors = Validator::new(&config, "monitors").validate(&MONITORS_SCHEMA);
        assert!(
            errors.iter().any(|e| e.contains("Missing required field")),
            "{errors:?}"
        );
    }

    #[test]
    fn test_case_and_underscore_insensitive_rules() {
        let config = as_map(json!({
            "placement": {"Sony": {"Left_Center_Of": "BenQ", "BOTTOMOF": "X"}},
        }));
        let errors = Validator::new(&config, "monitors").validate(&MONITORS_SCHEMA);
        assert!(errors.is_empty(), "{errors:?}");
    }
}
