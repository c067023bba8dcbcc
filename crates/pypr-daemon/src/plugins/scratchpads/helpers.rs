//! Helpers shared across the scratchpads plugin.

use pypr_types::MonitorInfo;
use regex::Regex;
use tracing::error;

/// Name of a scratchpad's private special workspace.
#[must_use]
pub fn mk_scratch_name(uid: &str) -> String {
    format!("special:scratch_{uid}")
}

/// Compiled window-matching rule. `re:`-prefixed values compile once at
/// config load.
#[derive(Debug, Clone)]
pub enum MatchRule {
    Exact(String),
    Regex(Regex),
}

impl MatchRule {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if let Some(pattern) = value.strip_prefix("re:") {
            match Regex::new(pattern) {
                Ok(regex) => return MatchRule::Regex(regex),
                Err(e) => {
                    error!("Invalid match pattern '{value}': {e}");
                }
            }
        }
        MatchRule::Exact(value.to_string())
    }

    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            MatchRule::Exact(expected) => value == expected,
            MatchRule::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Space identifiers (workspace + monitor) for every active screen.
#[must_use]
pub fn all_space_identifiers(monitors: &[MonitorInfo]) -> Vec<(String, String)> {
    monitors
        .iter()
        .map(|m| (m.active_workspace.name.clone(), m.name.clone()))
        .collect()
}

/// Offset of `position` relative to `reference`.
#[must_use]
pub fn compute_offset(position: (i32, i32), reference: (i32, i32)) -> (i32, i32) {
    (position.0 - reference.0, position.1 - reference.1)
}

/// Apply an offset to a base position.
#[must_use]
pub fn apply_offset(base: (i32, i32), offset: (i32, i32)) -> (i32, i32) {
    (base.0 + offset.0, base.1 + offset.1)
}

/// Layout-effective monitor size (scale-corrected, swapped when rotated).
// Pixel dimensions fit in i32 for any real display
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn get_size(monitor: &MonitorInfo) -> (i32, i32) {
    let width = (f64::from(monitor.width) / monitor.scale) as i32;
    let height = (f64::from(monitor.height) / monitor.scale) as i32;
    if monitor.is_rotated() {
        (height, width)
    } else {
        (width, height)
    }
}
