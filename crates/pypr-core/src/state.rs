//! Shared state for cross-plugin coordination.
//!
//! One `SharedState` value lives behind an `Arc<RwLock<_>>` for the whole
//! daemon. It is mutated only by the built-in core plugin (focus and monitor
//! events) and by the monitors plugin (disabled set); everything else reads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pypr_types::{Environment, VersionInfo};
use tokio::sync::RwLock;

pub type SharedStateRef = Arc<RwLock<SharedState>>;

/// Commonly requested compositor properties.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Active workspace name.
    pub active_workspace: String,
    /// Active monitor name.
    pub active_monitor: String,
    /// Active window address (`0x`-prefixed) or empty.
    pub active_window: String,
    pub environment: Environment,
    /// User variables for command template substitution.
    pub variables: HashMap<String, String>,
    /// Every known monitor name - the source of truth.
    pub monitors: Vec<String>,
    disabled_monitors: HashSet<String>,
    pub compositor_version: VersionInfo,
}

impl SharedState {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            active_workspace: String::new(),
            active_monitor: String::new(),
            active_window: String::new(),
            environment,
            variables: HashMap::new(),
            monitors: Vec::new(),
            disabled_monitors: HashSet::new(),
            compositor_version: VersionInfo::default(),
        }
    }

    /// Only the enabled monitors, in `monitors` order.
    #[must_use]
    pub fn active_monitors(&self) -> Vec<String> {
        self.monitors
            .iter()
            .filter(|m| !self.disabled_monitors.contains(*m))
            .cloned()
            .collect()
    }

    pub fn set_disabled_monitors(&mut self, disabled: HashSet<String>) {
        self.disabled_monitors = disabled;
    }

    /// Unique identifier for the currently focused workspace + monitor pair.
    #[must_use]
    pub fn active_space_identifier(&self) -> (String, String) {
        (self.active_workspace.clone(), self.active_monitor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_monitors_excludes_disabled() {
        let mut state = SharedState::new(Environment::Hyprland);
        state.monitors = vec!["DP-1".into(), "HDMI-A-1".into(), "eDP-1".into()];
        state.set_disabled_monitors(HashSet::from(["HDMI-A-1".to_string()]));

        assert_eq!(state.active_monitors(), vec!["DP-1", "eDP-1"]);
        // The full list is untouched.
        assert_eq!(state.monitors.len(), 3);
    }

    #[test]
    fn test_active_monitors_is_subset_of_monitors() {
        let mut state = SharedState::new(Environment::Niri);
        state.monitors = vec!["A".into(), "B".into()];
        state.set_disabled_monitors(HashSet::from(["C".to_string()]));
        for name in state.active_monitors() {
            assert!(state.monitors.contains(&name));
        }
    }

    #[test]
    fn test_space_identifier() {
        let mut state = SharedState::new(Environment::Hyprland);
        state.active_workspace = "3".into();
        state.active_monitor = "DP-1".into();
        assert_eq!(
            state.active_space_identifier(),
            ("3".to_string(), "DP-1".to_string())
        );
    }
}
