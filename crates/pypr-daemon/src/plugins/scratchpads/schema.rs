//! Configuration schema for the scratchpads plugin.

use std::sync::LazyLock;

use pypr_core::config::{ConfigField, FieldType, Schema, Validator};
use serde_json::{Value, json};

fn validate_animation(value: &Value) -> Vec<String> {
    let valid = ["", "fromtop", "frombottom", "fromleft", "fromright"];
    let ok = value
        .as_str()
        .is_some_and(|s| valid.contains(&s.to_lowercase().as_str()));
    if ok {
        vec![]
    } else {
        vec![format!(
            "invalid value '{value}' -> Valid: '', 'fromTop', 'fromBottom', 'fromLeft', 'fromRight'"
        )]
    }
}

/// Schema for one scratchpad entry.
pub static SCRATCHPAD_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        // Required
        ConfigField::new("command", FieldType::Str)
            .required()
            .describe("Command to run (omit for unmanaged scratchpads)"),
        // Basic
        ConfigField::new("class", FieldType::Str)
            .default_value(json!(""))
            .recommended()
            .describe("Window class for matching"),
        ConfigField::new("animation", FieldType::Str)
            .default_value(json!("fromTop"))
            .describe("Animation type")
            .choices(vec![
                json!(""),
                json!("fromTop"),
                json!("fromBottom"),
                json!("fromLeft"),
                json!("fromRight"),
            ])
            .validator(validate_animation),
        ConfigField::new("size", FieldType::Str)
            .default_value(json!("80% 80%"))
            .recommended()
            .describe("Window size (e.g. '80% 80%')"),
        // Positioning
        ConfigField::new("position", FieldType::Str)
            .default_value(json!(""))
            .describe("Explicit position override"),
        ConfigField::new("margin", FieldType::Int)
            .default_value(json!(60))
            .describe("Pixels from screen edge"),
        ConfigField::new("offset", FieldType::Str)
            .default_value(json!("100%"))
            .describe("Hide animation distance"),
        ConfigField::new("max_size", FieldType::Str)
            .default_value(json!(""))
            .describe("Maximum window size"),
        // Behavior
        ConfigField::new("lazy", FieldType::Bool)
            .default_value(json!(true))
            .describe("Start on first use"),
        ConfigField::new("pinned", FieldType::Bool)
            .default_value(json!(true))
            .describe("Sticky to monitor"),
        ConfigField::new("multi", FieldType::Bool)
            .default_value(json!(true))
            .describe("Allow multiple windows"),
        ConfigField::new("unfocus", FieldType::Str)
            .default_value(json!(""))
            .describe("Action on unfocus ('hide' or empty)"),
        ConfigField::new("hysteresis", FieldType::Float)
            .default_value(json!(0.4))
            .describe("Delay before unfocus hide"),
        ConfigField::new("excludes", FieldType::List)
            .default_value(json!([]))
            .describe("Scratches to hide when shown"),
        ConfigField::new("restore_excluded", FieldType::Bool)
            .default_value(json!(false))
            .describe("Restore excluded on hide"),
        ConfigField::new("preserve_aspect", FieldType::Bool)
            .default_value(json!(false))
            .describe("Keep size/position across shows"),
        ConfigField::new("hide_delay", FieldType::Float)
            .default_value(json!(0.0))
            .describe("Delay before hide animation"),
        ConfigField::new("force_monitor", FieldType::Str)
            .default_value(json!(""))
            .describe("Always show on specific monitor"),
        ConfigField::new("alt_toggle", FieldType::Bool)
            .default_value(json!(false))
            .describe("Alternative toggle for multi-monitor"),
        ConfigField::new("allow_special_workspaces", FieldType::Bool)
            .default_value(json!(true))
            .describe("Allow over special workspaces"),
        ConfigField::new("smart_focus", FieldType::Bool)
            .default_value(json!(true))
            .describe("Restore focus on hide"),
        ConfigField::new("close_on_hide", FieldType::Bool)
            .default_value(json!(false))
            .describe("Close instead of hide"),
        // Non-standard/troubleshooting
        ConfigField::new("match_by", FieldType::Str)
            .default_value(json!("pid"))
            .describe("Match method: pid, class, initialClass, title, initialTitle"),
        ConfigField::new("initialClass", FieldType::Str)
            .default_value(json!(""))
            .describe("Match value when match_by='initialClass'"),
        ConfigField::new("initialTitle", FieldType::Str)
            .default_value(json!(""))
            .describe("Match value when match_by='initialTitle'"),
        ConfigField::new("title", FieldType::Str)
            .default_value(json!(""))
            .describe("Match value when match_by='title'"),
        ConfigField::new("process_tracking", FieldType::Bool)
            .default_value(json!(true))
            .describe("Enable process management"),
        ConfigField::new("skip_windowrules", FieldType::List)
            .default_value(json!([]))
            .describe("Rules to skip: aspect, float, workspace"),
        // Template/inheritance
        ConfigField::new("use", FieldType::Str)
            .default_value(json!(""))
            .describe("Inherit from another scratchpad definition"),
        ConfigField::new("monitor", FieldType::Dict)
            .default_value(json!({}))
            .describe("Per-monitor config overrides"),
    ])
});

/// Override schema: everything but the non-overridable fields.
pub static MONITOR_OVERRIDE_SCHEMA: LazyLock<Schema> =
    LazyLock::new(|| SCRATCHPAD_SCHEMA.without(&["command", "use", "monitor"]));

/// Validate a single scratchpad's raw configuration.
#[must_use]
pub fn validate_scratchpad_config(
    name: &str,
    scratch_config: &serde_json::Map<String, Value>,
) -> Vec<String> {
    let prefix = format!("scratchpads.{name}");
    let validator = Validator::new(scratch_config, &prefix);
    let mut errors = validator.validate(&SCRATCHPAD_SCHEMA);
    errors.extend(validator.warn_unknown_keys(&SCRATCHPAD_SCHEMA));

    // Cross-field checks on the raw user config, before schema defaults.
    let match_by = scratch_config
        .get("match_by")
        .and_then(Value::as_str)
        .unwrap_or("pid");
    if match_by != "pid" && !scratch_config.contains_key(match_by) {
        errors.push(format!(
            "[{prefix}] match_by='{match_by}' requires '{match_by}' to be defined"
        ));
    }

    if !scratch_config.contains_key("command") && !scratch_config.contains_key("class") {
        errors.push(format!(
            "[{prefix}] unmanaged scratchpads (no command) require 'class' to be defined"
        ));
    }

    if let Some(overrides) = scratch_config.get("monitor").and_then(Value::as_object) {
        for (monitor_name, override_config) in overrides {
            let scope = format!("{prefix}.monitor.{monitor_name}");
            match override_config.as_object() {
                Some(obj) => {
                    let nested = Validator::new(obj, &scope);
                    errors.extend(nested.validate(&MONITOR_OVERRIDE_SCHEMA));
                    errors.extend(nested.warn_unknown_keys(&MONITOR_OVERRIDE_SCHEMA));
                }
                None => errors.push(format!("[{scope}] expected dict")),
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_minimal_valid_scratchpad() {
        let config = as_map(json!({"command": "kitty --class dropterm", "class": "dropterm"}));
        let errors = validate_scratchpad_config("term", &config);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_match_by_requires_field() {
        let config = as_map(json!({"command": "kitty", "match_by": "title"}));
        let errors = validate_scratchpad_config("term", &config);
        assert!(errors.iter().any(|e| e.contains("requires 'title'")), "{errors:?}");
    }

    #[test]
    fn test_unmanaged_requires_class() {
        let config = as_map(json!({"title": "music"}));
        let errors = validate_scratchpad_config("music", &config);
        assert!(
            errors.iter().any(|e| e.contains("require 'class'")),
            "{errors:?}"
        );
    }

    #[test]
    fn test_bad_animation_choice() {
        let config = as_map(json!({"command": "kitty", "animation": "diagonal"}));
        let errors = validate_scratchpad_config("term", &config);
        assert!(errors.iter().any(|e| e.contains("invalid value")), "{errors:?}");
    }

    #[test]
    fn test_animation_case_insensitive() {
        let config = as_map(json!({"command": "kitty", "animation": "FROMTOP"}));
        let errors = validate_scratchpad_config("term", &config);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_monitor_override_validated() {
        let config = as_map(json!({
            "command": "kitty",
            "monitor": {"DP-1": {"size": "30% 30%", "command": "forbidden"}},
        }));
        let errors = validate_scratchpad_config("term", &config);
        // `command` is not overridable per monitor.
        assert!(errors.iter().any(|e| e.contains("monitor.DP-1")), "{errors:?}");
    }

    #[test]
    fn test_typo_suggestion() {
        let config = as_map(json!({"command": "kitty", "lzy": true}));
        let errors = validate_scratchpad_config("term", &config);
        assert!(errors.iter().any(|e| e.contains("did you mean")), "{errors:?}");
    }
}
