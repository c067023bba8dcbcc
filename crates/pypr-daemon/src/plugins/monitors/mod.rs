//! Relative placement and configuration of monitors.

mod commands;
mod layout;
mod resolve;
mod schema;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pypr_core::Result;
use pypr_core::backend::proxy::BackendProxy;
use pypr_core::config::{ConfigView, Schema};
use pypr_core::state::SharedStateRef;
use pypr_types::{Environment, MonitorInfo};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, Job, Plugin, PluginCtx, QueueItem, ReloadReason};
use commands::{
    build_hyprland_command, build_niri_disable_action, build_niri_position_action,
    build_niri_scale_action, build_niri_transform_action,
};
use layout::{build_graph, compute_positions, find_cycle_path, normalize_positions};
use resolve::{get_monitor_by_pattern, resolve_placement_config};
use schema::MONITORS_SCHEMA;

/// Window during which compositor config reloads are attributed to our own
/// layout writes and ignored.
const RELAYOUT_IGNORE_WINDOW: Duration = Duration::from_secs(3);

/// Settle time before a debounced relayout fires.
const RELAYOUT_DEBOUNCE_DELAY: Duration = Duration::from_secs(1);

/// Internal handler queued by the debounce timer.
const RELAYOUT_HANDLER: &str = "_relayout";

const EVENT_HANDLERS: &[&str] = &[
    "event_monitoradded",
    "event_configreloaded",
    "niri_outputschanged",
];

const COMMANDS: &[CommandSpec] = &[CommandSpec {
    name: "relayout",
    args: "",
    short: "Recompute & apply every monitors's layout",
    detail: "",
}];

pub struct MonitorsPlugin {
    name: String,
    state: SharedStateRef,
    backend: BackendProxy,
    self_queue: mpsc::UnboundedSender<QueueItem>,
    config: ConfigView,
    pattern_cache: HashMap<String, String>,
    relayout_ignore_until: Option<Instant>,
    /// Pending debounced relayout timer, if any.
    relayout_task: Option<JoinHandle<()>>,
}

impl MonitorsPlugin {
    #[must_use]
    pub fn new(ctx: PluginCtx) -> Self {
        Self {
            name: ctx.name,
            state: ctx.state,
            backend: ctx.backend,
            self_queue: ctx.self_queue,
            config: ConfigView::default(),
            pattern_cache: HashMap::new(),
            relayout_ignore_until: None,
            relayout_task: None,
        }
    }

    /// Debounce: cancel any pending timer and arm a new one that enqueues
    /// the delayed relayout, so bursts of config reloads collapse into one
    /// run.
    fn schedule_relayout(&mut self) {
        if let Some(task) = self.relayout_task.take() {
            task.abort();
        }
        let queue = self.self_queue.clone();
        self.relayout_task = Some(tokio::spawn(async move {
            tokio::time::sleep(RELAYOUT_DEBOUNCE_DELAY).await;
            let _ = queue.send(Some(Job {
                handler: RELAYOUT_HANDLER.to_string(),
                args: String::new(),
                respond: None,
            }));
        }));
    }

    /// Delayed relayout that runs twice with a 1 s gap, letting the
    /// compositor settle between passes.
    async fn handle_delayed_relayout(&mut self) -> Result<()> {
        self.relayout_task = None;
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.run_relayout(None).await?;
        }
        Ok(())
    }

    /// Recompute and apply the layout. Returns false when no placement
    /// rule resolved against the connected monitors.
    async fn run_relayout(&mut self, monitors: Option<Vec<MonitorInfo>>) -> Result<bool> {
        let monitors = match monitors {
            Some(m) => m,
            None => self.backend.get_monitors(true).await?,
        };
        self.pattern_cache.clear();

        let placement = self.config.get_dict("placement");
        let resolved = resolve_placement_config(&placement, &monitors, &mut self.pattern_cache);
        if resolved.is_empty() {
            debug!("No configuration item is applicable");
            return Ok(false);
        }
        debug!("Using {resolved:?}");

        let mut monitors_by_name: HashMap<String, MonitorInfo> = monitors
            .iter()
            .map(|m| (m.name.clone(), m.clone()))
            .collect();

        // Monitors named in any `disables` list are powered off and leave
        // the active set.
        let mut to_disable: HashSet<String> = HashSet::new();
        for cfg in resolved.values() {
            if let Some(disables) = cfg.get("disables").and_then(Value::as_array) {
                to_disable.extend(
                    disables
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }
        }
        for name in &to_disable {
            if let Some(mon) = monitors_by_name.get_mut(name) {
                mon.to_disable = true;
            }
        }
        let enabled: HashMap<String, MonitorInfo> = monitors_by_name
            .iter()
            .filter(|(_, m)| !m.to_disable)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let (tree, in_degree, multi_target_info) = build_graph(&resolved, &enabled);
        for (name, rule_name, targets) in &multi_target_info {
            debug!(
                "Multiple targets for {name}.{rule_name}: {targets:?} - using first: {}",
                targets[0]
            );
        }

        let (positions, unprocessed) = compute_positions(&enabled, &tree, &in_degree, &resolved);
        if !unprocessed.is_empty() {
            warn!(
                "Circular dependency detected: {}. Ensure at least one monitor has no placement rule (anchor).",
                find_cycle_path(&resolved, &unprocessed)
            );
            return Ok(false);
        }

        {
            let mut state = self.state.write().await;
            state.set_disabled_monitors(to_disable.iter().cloned().collect());
        }

        if positions.is_empty() && to_disable.is_empty() {
            return Ok(false);
        }
        let normalized = normalize_positions(&positions);

        if self.backend.environment() == Environment::Niri {
            self.apply_niri_layout(&normalized, &to_disable, &resolved)
                .await?;
        } else {
            self.apply_hyprland_layout(&normalized, &monitors_by_name, &to_disable, &resolved)
                .await?;
        }
        Ok(true)
    }

    async fn apply_hyprland_layout(
        &mut self,
        positions: &HashMap<String, (i32, i32)>,
        monitors_by_name: &HashMap<String, MonitorInfo>,
        to_disable: &HashSet<String>,
        resolved: &layout::PlacementConfig,
    ) -> Result<()> {
        let mut names: Vec<&String> = positions.keys().collect();
        names.sort();

        let mut keyword_commands = Vec::new();
        for name in names {
            let Some(mon) = monitors_by_name.get(name) else {
                continue;
            };
            let mut mon = mon.clone();
            (mon.x, mon.y) = positions[name];
            keyword_commands.push(build_hyprland_command(&mon, resolved.get(name)));
        }
        for name in to_disable {
            keyword_commands.push(format!("monitor {name},disable"));
        }

        // Our own writes trigger a config reload; ignore the echo.
        self.relayout_ignore_until = Some(Instant::now() + RELAYOUT_IGNORE_WINDOW);

        for command in keyword_commands {
            debug!("{command}");
            self.backend.execute_with(&command, "keyword", false).await?;
        }
        Ok(())
    }

    async fn apply_niri_layout(
        &mut self,
        positions: &HashMap<String, (i32, i32)>,
        to_disable: &HashSet<String>,
        resolved: &layout::PlacementConfig,
    ) -> Result<()> {
        for name in to_disable {
            self.backend
                .execute_action(build_niri_disable_action(name))
                .await?;
        }

        let mut names: Vec<&String> = positions.keys().collect();
        names.sort();
        for name in names {
            let (x, y) = positions[name];
            self.backend
                .execute_action(build_niri_position_action(name, x, y))
                .await?;

            let cfg = resolved.get(name);
            if let Some(scale) = cfg.and_then(|c| c.get("scale")).and_then(Value::as_f64) {
                self.backend
                    .execute_action(build_niri_scale_action(name, scale))
                    .await?;
            }
            if let Some(transform) = cfg.and_then(|c| c.get("transform")).and_then(Value::as_i64)
            {
                self.backend
                    .execute_action(build_niri_transform_action(name, transform))
                    .await?;
            }
        }
        Ok(())
    }

    /// Run hotplug commands matching the given monitor.
    async fn hotplug_command(&mut self, monitors: &[MonitorInfo], name: &str) {
        for (pattern, command) in self.config.get_dict("hotplug_commands") {
            let Some(command) = command.as_str() else {
                continue;
            };
            let matched = get_monitor_by_pattern(&pattern, monitors, &mut self.pattern_cache)
                .is_some_and(|m| m.name == name);
            if matched {
                spawn_shell(command);
                break;
            }
        }
        let single = self.config.get_str("hotplug_command");
        if !single.is_empty() {
            spawn_shell(&single);
        }
    }

    async fn event_monitoradded(&mut self, name: &str) -> Result<()> {
        let delay = self.config.get_float("new_monitor_delay", 1.0);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;

        let monitors = self.backend.get_monitors(true).await?;
        self.hotplug_command(&monitors, name).await;

        if !self.run_relayout(Some(monitors)).await? {
            let default_command = self.config.get_str("unknown");
            if !default_command.is_empty() {
                spawn_shell(&default_command);
            }
        }
        Ok(())
    }

    fn event_configreloaded(&mut self) {
        if !self.config.get_bool("relayout_on_config_change", true) {
            return;
        }
        if self
            .relayout_ignore_until
            .is_some_and(|until| Instant::now() < until)
        {
            debug!("Relayout suppressed (self-inflicted config reload)");
            return;
        }
        self.schedule_relayout();
    }

    async fn niri_outputschanged(&mut self) -> Result<()> {
        let delay = self.config.get_float("new_monitor_delay", 1.0);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        self.run_relayout(None).await?;
        Ok(())
    }
}

fn spawn_shell(command: &str) {
    debug!("spawning: {command}");
    if let Err(e) = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .spawn()
    {
        warn!("Failed to spawn '{command}': {e}");
    }
}

#[async_trait]
impl Plugin for MonitorsPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn environments(&self) -> &'static [Environment] {
        &[Environment::Hyprland, Environment::Niri]
    }

    fn schema(&self) -> Option<&'static Schema> {
        Some(&MONITORS_SCHEMA)
    }

    fn event_handlers(&self) -> &'static [&'static str] {
        EVENT_HANDLERS
    }

    fn commands(&self) -> &'static [CommandSpec] {
        COMMANDS
    }

    fn load_config(&mut self, view: ConfigView) {
        self.config = view;
    }

    async fn on_reload(&mut self, _reason: ReloadReason) -> Result<()> {
        self.pattern_cache.clear();
        self.relayout_ignore_until = None;
        if let Some(task) = self.relayout_task.take() {
            task.abort();
        }

        let monitors = self.backend.get_monitors(true).await?;
        let known = { self.state.read().await.monitors.clone() };
        for name in known {
            self.hotplug_command(&monitors, &name).await;
        }

        if self.config.get_bool("startup_relayout", true) {
            self.run_relayout(Some(monitors)).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.run_relayout(None).await?;
        }
        Ok(())
    }

    async fn on_event(&mut self, handler: &str, payload: &str) -> Result<()> {
        match handler {
            "event_monitoradded" => self.event_monitoradded(payload).await,
            "event_configreloaded" => {
                self.event_configreloaded();
                Ok(())
            }
            "niri_outputschanged" => self.niri_outputschanged().await,
            RELAYOUT_HANDLER => self.handle_delayed_relayout().await,
            _ => Ok(()),
        }
    }

    async fn on_command(&mut self, command: &str, _args: &str) -> Result<Option<String>> {
        if command == "relayout" {
            self.run_relayout(None).await?;
        }
        Ok(None)
    }
}
