//! Schema-aware typed access to a plugin's config subtree.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use super::schema::Schema;

/// Strings coerced to `true` by `get_bool`.
pub const BOOL_TRUE_STRINGS: [&str; 5] = ["true", "yes", "on", "1", "enabled"];
/// Strings coerced to `false` by `get_bool`.
pub const BOOL_FALSE_STRINGS: [&str; 5] = ["false", "no", "off", "0", "disabled"];
/// Every recognized boolean string.
pub const BOOL_STRINGS: [&str; 10] = [
    "true", "yes", "on", "1", "enabled", "false", "no", "off", "0", "disabled",
];

/// Coerce a loosely typed value to a boolean.
///
/// Missing values yield `default`; an empty string is false; an explicit
/// falsy string is false; any other non-empty string is true; everything
/// else follows its truthiness.
#[must_use]
pub fn coerce_to_bool(value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let trimmed = s.trim().to_lowercase();
            if trimmed.is_empty() {
                false
            } else {
                !BOOL_FALSE_STRINGS.contains(&trimmed.as_str())
            }
        }
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// A plugin's configuration subtree plus its schema defaults.
#[derive(Clone, Default)]
pub struct ConfigView {
    scope: String,
    values: serde_json::Map<String, Value>,
    defaults: HashMap<String, Value>,
}

impl ConfigView {
    #[must_use]
    pub fn new(scope: &str, values: Value, schema: Option<&Schema>) -> Self {
        let values = values.as_object().cloned().unwrap_or_default();
        let defaults = schema
            .map(|s| {
                s.fields()
                    .filter_map(|f| f.default.clone().map(|d| (f.name.to_string(), d)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            scope: scope.to_string(),
            values,
            defaults,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Raw user value, else schema default, else `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| self.defaults.get(name))
    }

    /// True when the user set the value explicitly (not a schema default).
    #[must_use]
    pub fn has_explicit(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        coerce_to_bool(self.get(name), default)
    }

    // Float config values are rounded toward zero when an int is requested
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            None => default,
            Some(Value::Number(n)) => n.as_i64().unwrap_or_else(|| {
                n.as_f64().map_or(default, |f| f as i64)
            }),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!("[{}] Invalid integer value for {name}: {s}", self.scope);
                default
            }),
            Some(other) => {
                warn!("[{}] Invalid integer value for {name}: {other}", self.scope);
                default
            }
        }
    }

    #[must_use]
    pub fn get_float(&self, name: &str, default: f64) -> f64 {
        match self.get(name) {
            None => default,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!("[{}] Invalid float value for {name}: {s}", self.scope);
                default
            }),
            Some(other) => {
                warn!("[{}] Invalid float value for {name}: {other}", self.scope);
                default
            }
        }
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> String {
        match self.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    #[must_use]
    pub fn get_list(&self, name: &str) -> Vec<Value> {
        self.get(name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// List of strings; a single string value is wrapped as one element.
    #[must_use]
    pub fn get_str_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn get_dict(&self, name: &str) -> serde_json::Map<String, Value> {
        self.get(name)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys whose values are tables (e.g. defined scratchpads).
    pub fn iter_subsections(&self) -> impl Iterator<Item = (&String, &serde_json::Map<String, Value>)> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.as_object().map(|obj| (k, obj)))
    }

    #[must_use]
    pub fn raw(&self) -> &serde_json::Map<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ConfigField, FieldType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            ConfigField::new("size", FieldType::Str).default_value(json!("80% 80%")),
            ConfigField::new("lazy", FieldType::Bool).default_value(json!(false)),
            ConfigField::new("hysteresis", FieldType::Float).default_value(json!(0.4)),
        ])
    }

    #[test]
    fn test_get_prefers_user_value() {
        let view = ConfigView::new("s", json!({"size": "50% 50%"}), Some(&schema()));
        assert_eq!(view.get_str("size"), "50% 50%");
    }

    #[test]
    fn test_get_falls_back_to_schema_default() {
        let view = ConfigView::new("s", json!({}), Some(&schema()));
        assert_eq!(view.get_str("size"), "80% 80%");
        assert!((view.get_float("hysteresis", 0.0) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_has_explicit_distinguishes_defaults() {
        let view = ConfigView::new("s", json!({"lazy": true}), Some(&schema()));
        assert!(view.has_explicit("lazy"));
        assert!(!view.has_explicit("size"));
        assert!(view.get("size").is_some());
    }

    #[test]
    fn test_get_bool_coercions() {
        let view = ConfigView::new(
            "s",
            json!({
                "a": "yes", "b": "off", "c": "", "d": "whatever",
                "e": 1, "f": 0, "g": true,
            }),
            None,
        );
        assert!(view.get_bool("a", false));
        assert!(!view.get_bool("b", true));
        assert!(!view.get_bool("c", true));
        assert!(view.get_bool("d", false));
        assert!(view.get_bool("e", false));
        assert!(!view.get_bool("f", true));
        assert!(view.get_bool("g", false));
        assert!(view.get_bool("missing", true));
    }

    #[test]
    fn test_get_int_tolerates_numeric_strings() {
        let view = ConfigView::new("s", json!({"margin": "42", "bad": "nope"}), None);
        assert_eq!(view.get_int("margin", 0), 42);
        assert_eq!(view.get_int("bad", 7), 7);
        assert_eq!(view.get_int("missing", 9), 9);
    }

    #[test]
    fn test_get_str_list_wraps_single_string() {
        let view = ConfigView::new("s", json!({"one": "a", "many": ["a", "b"], "empty": ""}), None);
        assert_eq!(view.get_str_list("one"), vec!["a"]);
        assert_eq!(view.get_str_list("many"), vec!["a", "b"]);
        assert!(view.get_str_list("empty").is_empty());
    }

    #[test]
    fn test_iter_subsections() {
        let view = ConfigView::new(
            "scratchpads",
            json!({"term": {"command": "kitty"}, "lazy": true}),
            None,
        );
        let subs: Vec<_> = view.iter_subsections().map(|(k, _)| k.clone()).collect();
        assert_eq!(subs, vec!["term"]);
    }
}
