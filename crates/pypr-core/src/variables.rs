//! User variable substitution for spawn commands.

use std::collections::HashMap;

/// Replace `[name]` tokens with values from the user's `variables` table.
///
/// Unknown tokens are left untouched so commands containing literal brackets
/// keep working.
#[must_use]
pub fn apply_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (name, value) in variables {
        result = result.replace(&format!("[{name}]"), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_variables() {
        let vars = HashMap::from([
            ("term".to_string(), "kitty".to_string()),
            ("class".to_string(), "dropterm".to_string()),
        ]);
        assert_eq!(
            apply_variables("[term] --class [class]", &vars),
            "kitty --class dropterm"
        );
    }

    #[test]
    fn test_apply_variables_unknown_token_kept() {
        let vars = HashMap::new();
        assert_eq!(apply_variables("echo [nope]", &vars), "echo [nope]");
    }
}
