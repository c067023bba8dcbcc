//! Typed schema for plugin configuration options.
//!
//! A schema is an ordered list of field descriptors used for three things:
//! validating the user's config, answering "what is the default for X", and
//! suggesting a close key name when the user made a typo.

use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config as MatcherConfig, Matcher};
use serde_json::Value;

use super::view::BOOL_STRINGS;

/// Expected value type for a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
}

impl FieldType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::List => "list",
            FieldType::Dict => "dict",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Bool => match value {
                Value::Bool(_) => true,
                Value::String(s) => BOOL_STRINGS.contains(&s.to_lowercase().as_str()),
                _ => false,
            },
            FieldType::Int => match value {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            FieldType::Float => match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            },
            FieldType::Str => value.is_string(),
            FieldType::List => value.is_array(),
            FieldType::Dict => value.is_object(),
        }
    }
}

/// Custom validator returning a list of error strings.
pub type FieldValidator = fn(&Value) -> Vec<String>;

/// One expected configuration field.
#[derive(Clone)]
pub struct ConfigField {
    pub name: &'static str,
    pub types: Vec<FieldType>,
    pub required: bool,
    pub recommended: bool,
    pub default: Option<Value>,
    pub description: &'static str,
    pub choices: Option<Vec<Value>>,
    pub validator: Option<FieldValidator>,
    pub children: Option<Schema>,
    /// Allow keys not covered by `children` (dynamic sub-keys).
    pub children_allow_extra: bool,
}

impl ConfigField {
    #[must_use]
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            types: vec![field_type],
            required: false,
            recommended: false,
            default: None,
            description: "",
            choices: None,
            validator: None,
            children: None,
            children_allow_extra: false,
        }
    }

    #[must_use]
    pub fn union(name: &'static str, types: &[FieldType]) -> Self {
        let mut field = Self::new(name, types[0]);
        field.types = types.to_vec();
        field
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn describe(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }

    #[must_use]
    pub fn choices(mut self, values: Vec<Value>) -> Self {
        self.choices = Some(values);
        self
    }

    #[must_use]
    pub fn validator(mut self, f: FieldValidator) -> Self {
        self.validator = Some(f);
        self
    }

    #[must_use]
    pub fn children(mut self, schema: Schema, allow_extra: bool) -> Self {
        self.children = Some(schema);
        self.children_allow_extra = allow_extra;
        self
    }

    fn type_name(&self) -> String {
        self.types
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

/// Ordered list of fields.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<ConfigField>,
}

impl Schema {
    #[must_use]
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &ConfigField> {
        self.fields.iter()
    }

    /// Derive a new schema keeping only fields not in `excluded`.
    #[must_use]
    pub fn without(&self, excluded: &[&str]) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .filter(|f| !excluded.contains(&f.name))
                .cloned()
                .collect(),
        }
    }
}

fn format_config_error(scope: &str, field: &str, message: &str, suggestion: &str) -> String {
    let mut msg = format!("[{scope}] Config error for '{field}': {message}");
    if !suggestion.is_empty() {
        msg.push_str(" -> ");
        msg.push_str(suggestion);
    }
    msg
}

/// Find a similar key using fuzzy matching, for typo suggestions.
#[must_use]
pub fn find_similar_key(unknown: &str, known: &[&str]) -> Option<String> {
    let mut matcher = Matcher::new(MatcherConfig::DEFAULT);
    let matches = Pattern::parse(unknown, CaseMatching::Ignore, Normalization::Smart)
        .match_list(known.iter().copied(), &mut matcher);
    matches.first().map(|(key, _)| (*key).to_string())
}

/// Validates a config table against a schema.
pub struct Validator<'a> {
    config: &'a serde_json::Map<String, Value>,
    scope: String,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(config: &'a serde_json::Map<String, Value>, scope: &str) -> Self {
        Self {
            config,
            scope: scope.to_string(),
        }
    }

    /// Run all checks: required fields, types, choices, custom validators,
    /// then nested children tables.
    #[must_use]
    pub fn validate(&self, schema: &Schema) -> Vec<String> {
        let mut errors = Vec::new();

        for field in schema.fields() {
            let Some(value) = self.config.get(field.name) else {
                if field.required {
                    errors.push(format_config_error(
                        &self.scope,
                        field.name,
                        "Missing required field",
                        &self.required_suggestion(field),
                    ));
                }
                continue;
            };

            if let Some(type_error) = self.check_type(field, value) {
                errors.push(type_error);
                continue;
            }

            // A custom validator replaces the plain choices check.
            if let Some(choices) = &field.choices {
                if field.validator.is_none() && !choices.contains(value) {
                    let choices_str = choices
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(format_config_error(
                        &self.scope,
                        field.name,
                        &format!("Invalid value {value}"),
                        &format!("Valid options: {choices_str}"),
                    ));
                }
            }

            if let Some(validator) = field.validator {
                for validation_error in validator(value) {
                    errors.push(format_config_error(
                        &self.scope,
                        field.name,
                        &validation_error,
                        "",
                    ));
                }
            }

            if let (Some(children), Some(obj)) = (&field.children, value.as_object()) {
                errors.extend(self.validate_children(field, children, obj));
            }
        }

        errors
    }

    fn validate_children(
        &self,
        field: &ConfigField,
        children: &Schema,
        obj: &serde_json::Map<String, Value>,
    ) -> Vec<String> {
        let scope = format!("{}.{}", self.scope, field.name);
        let nested = Validator::new(obj, &scope);
        let mut errors = nested.validate(children);
        if !field.children_allow_extra {
            errors.extend(nested.warn_unknown_keys(children));
        }
        errors
    }

    /// Warnings for keys not covered by the schema, each with a fuzzy
    /// suggestion when a close match exists.
    #[must_use]
    pub fn warn_unknown_keys(&self, schema: &Schema) -> Vec<String> {
        let known: Vec<&str> = schema.fields().map(|f| f.name).collect();
        let mut warnings = Vec::new();

        for key in self.config.keys() {
            if known.contains(&key.as_str()) {
                continue;
            }
            let msg = match find_similar_key(key, &known) {
                Some(similar) => format!(
                    "[{}] Unknown option '{key}' (did you mean '{similar}'?)",
                    self.scope
                ),
                None => format!("[{}] Unknown option '{key}' - will be ignored", self.scope),
            };
            warnings.push(msg);
        }

        warnings
    }

    fn check_type(&self, field: &ConfigField, value: &Value) -> Option<String> {
        if field.types.iter().any(|t| t.accepts(value)) {
            return None;
        }
        let got = match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "str",
            Value::Array(_) => "list",
            Value::Object(_) => "dict",
        };
        let hint = match field.types[0] {
            FieldType::Bool => "Use true/false (without quotes)".to_string(),
            FieldType::Int | FieldType::Float => format!("Use {} = 42 (without quotes)", field.name),
            FieldType::Str => format!("Use {} = \"value\"", field.name),
            FieldType::List => format!("Use {} = [\"item1\", \"item2\"]", field.name),
            FieldType::Dict => String::new(),
        };
        Some(format_config_error(
            &self.scope,
            field.name,
            &format!("Expected {}, got {got}", field.type_name()),
            &hint,
        ))
    }

    fn required_suggestion(&self, field: &ConfigField) -> String {
        match field.types[0] {
            FieldType::Str => format!("Add {} = \"value\" to [{}]", field.name, self.scope),
            FieldType::Int | FieldType::Float => {
                let example = field
                    .default
                    .as_ref()
                    .map_or_else(|| "0".to_string(), ToString::to_string);
                format!("Add {} = {example} to [{}]", field.name, self.scope)
            }
            FieldType::Bool => format!("Add {} = true/false to [{}]", field.name, self.scope),
            FieldType::List => format!("Add {} = [\"item\"] to [{}]", field.name, self.scope),
            FieldType::Dict => format!("Add '{}' to [{}]", field.name, self.scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            ConfigField::new("command", FieldType::Str)
                .required()
                .describe("Command to run"),
            ConfigField::new("size", FieldType::Str).default_value(json!("80% 80%")),
            ConfigField::new("lazy", FieldType::Bool).default_value(json!(true)),
            ConfigField::new("margin", FieldType::Int).default_value(json!(60)),
            ConfigField::new("animation", FieldType::Str)
                .choices(vec![json!(""), json!("fromTop"), json!("fromBottom")]),
            ConfigField::union("rate", &[FieldType::Int, FieldType::Float]),
        ])
    }

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = as_map(json!({
            "command": "kitty",
            "size": "60% 50%",
            "lazy": false,
            "margin": 30,
        }));
        let errors = Validator::new(&config, "scratchpads.term").validate(&schema());
        assert!(errors.is_empty(), "unexpected: {errors:?}");
    }

    #[test]
    fn test_missing_required_field() {
        let config = as_map(json!({"size": "50% 50%"}));
        let errors = Validator::new(&config, "scratchpads.term").validate(&schema());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Missing required field"));
        assert!(errors[0].contains("command"));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let config = as_map(json!({"command": "kitty", "margin": []}));
        let errors = Validator::new(&config, "scratchpads.term").validate(&schema());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Expected int"));
    }

    #[test]
    fn test_numeric_string_accepted_for_int() {
        let config = as_map(json!({"command": "kitty", "margin": "42"}));
        let errors = Validator::new(&config, "scratchpads.term").validate(&schema());
        assert!(errors.is_empty(), "unexpected: {errors:?}");
    }

    #[test]
    fn test_bool_accepts_coercible_strings() {
        for s in ["yes", "off", "ENABLED", "0"] {
            let config = as_map(json!({"command": "kitty", "lazy": s}));
            let errors = Validator::new(&config, "s").validate(&schema());
            assert!(errors.is_empty(), "{s}: {errors:?}");
        }
        let config = as_map(json!({"command": "kitty", "lazy": "maybe"}));
        let errors = Validator::new(&config, "s").validate(&schema());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_choices_enforced() {
        let config = as_map(json!({"command": "kitty", "animation": "diagonal"}));
        let errors = Validator::new(&config, "s").validate(&schema());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Valid options"));
    }

    #[test]
    fn test_union_type() {
        for rate in [json!(60), json!(59.95)] {
            let config = as_map(json!({"command": "kitty", "rate": rate}));
            let errors = Validator::new(&config, "s").validate(&schema());
            assert!(errors.is_empty(), "{errors:?}");
        }
        let config = as_map(json!({"command": "kitty", "rate": [60]}));
        let errors = Validator::new(&config, "s").validate(&schema());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("int or float"));
    }

    #[test]
    fn test_custom_validator_runs() {
        fn no_empty(value: &Value) -> Vec<String> {
            if value.as_str().is_some_and(str::is_empty) {
                vec!["must not be empty".to_string()]
            } else {
                vec![]
            }
        }
        let schema = Schema::new(vec![
            ConfigField::new("name", FieldType::Str).validator(no_empty)
        ]);
        let config = as_map(json!({"name": ""}));
        let errors = Validator::new(&config, "s").validate(&schema);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must not be empty"));
    }

    #[test]
    fn test_unknown_key_suggestion() {
        let config = as_map(json!({"command": "kitty", "lzy": true}));
        let warnings = Validator::new(&config, "s").warn_unknown_keys(&schema());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("did you mean 'lazy'"), "{warnings:?}");
    }

    #[test]
    fn test_unknown_key_without_match() {
        let config = as_map(json!({"command": "kitty", "zzzqqq": 1}));
        let warnings = Validator::new(&config, "s").warn_unknown_keys(&schema());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("will be ignored"));
    }

    #[test]
    fn test_nested_children_validated() {
        let schema = Schema::new(vec![ConfigField::new("placement", FieldType::Dict)
            .children(
                Schema::new(vec![ConfigField::new("scale", FieldType::Float)]),
                false,
            )]);
        let config = as_map(json!({"placement": {"scale": "not a number"}}));
        let errors = Validator::new(&config, "monitors").validate(&schema);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("monitors.placement"));
    }

    #[test]
    fn test_schema_without() {
        let derived = schema().without(&["command", "rate"]);
        assert!(derived.get("command").is_none());
        assert!(derived.get("size").is_some());
    }
}
