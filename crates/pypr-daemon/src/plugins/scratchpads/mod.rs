//! Scratchpads: drop-down windows hidden on private special workspaces and
//! summoned to the current one with animation.

mod anim;
mod db;
mod events;
mod helpers;
mod lifecycle;
mod object;
mod schema;
mod transitions;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use pypr_core::backend::proxy::BackendProxy;
use pypr_core::config::ConfigView;
use pypr_core::state::SharedStateRef;
use pypr_core::{Error, Result};
use pypr_types::{Environment, VersionInfo};
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CommandSpec, Job, Plugin, PluginCtx, QueueItem, ReloadReason};
use db::ScratchDb;
use object::Scratch;
use schema::validate_scratchpad_config;

/// Unfocus events within this window of a show are ignored.
const AFTER_SHOW_INHIBITION: Duration = Duration::from_millis(300);

/// Internal handler queued by the hysteresis timer.
const AUTOHIDE_HANDLER: &str = "_autohide";

const EVENT_HANDLERS: &[&str] = &[
    "event_activewindowv2",
    "event_openwindow",
    "event_closewindow",
    "event_workspace",
    "event_monitorremoved",
    "event_configreloaded",
    "event_changefloatingmode",
];

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "toggle",
        args: "<name>",
        short: "toggles visibility of scratchpad \"name\"",
        detail: "Several names can be given, separated by spaces.",
    },
    CommandSpec {
        name: "show",
        args: "<name>",
        short: "shows scratchpad \"name\"",
        detail: "Use \"*\" to show every scratchpad.",
    },
    CommandSpec {
        name: "hide",
        args: "<name>",
        short: "hides scratchpad \"name\"",
        detail: "Use \"*\" to hide every scratchpad.",
    },
    CommandSpec {
        name: "attach",
        args: "",
        short: "attach the focused window to the last focused scratchpad",
        detail: "Run it again on the same window to detach it.",
    },
];

/// Hide behavior variants.
#[derive(Debug, Default, Clone, Copy)]
pub struct HideFlavors {
    pub forced: bool,
    pub autohide: bool,
    pub ignore_tiled: bool,
}

impl HideFlavors {
    const AUTOHIDE: Self = Self {
        forced: false,
        autohide: true,
        ignore_tiled: false,
    };
    const AUTOHIDE_IGNORE_TILED: Self = Self {
        forced: false,
        autohide: true,
        ignore_tiled: true,
    };
}

/// Focus restoration record captured when a scratchpad is shown.
#[derive(Debug, Clone)]
struct FocusTracker {
    prev_focused_window: String,
    prev_focused_window_wrkspc: String,
}

/// Copy of the shared state taken at handler entry, so config lookups and
/// visibility checks see one consistent view.
#[derive(Default, Clone)]
struct StateSnapshot {
    active_workspace: String,
    active_monitor: String,
    active_window: String,
    monitors: Vec<String>,
    variables: HashMap<String, String>,
    version: VersionInfo,
}

pub struct ScratchpadsPlugin {
    name: String,
    state: SharedStateRef,
    backend: BackendProxy,
    self_queue: mpsc::UnboundedSender<QueueItem>,
    config: ConfigView,
    scratches: ScratchDb,
    procs: HashMap<String, Child>,
    hysteresis_tasks: HashMap<String, JoinHandle<()>>,
    /// Scratchpads with a show or hide transition in flight.
    transitioning: HashSet<String>,
    focused_window_tracking: HashMap<String, FocusTracker>,
    previously_focused_window: String,
    last_focused: Option<String>,
    snap: StateSnapshot,
}

impl ScratchpadsPlugin {
    #[must_use]
    pub fn new(ctx: PluginCtx) -> Self {
        Self {
            name: ctx.name,
            state: ctx.state,
            backend: ctx.backend,
            self_queue: ctx.self_queue,
            config: ConfigView::default(),
            scratches: ScratchDb::default(),
            procs: HashMap::new(),
            hysteresis_tasks: HashMap::new(),
            transitioning: HashSet::new(),
            focused_window_tracking: HashMap::new(),
            previously_focused_window: String::new(),
            last_focused: None,
            snap: StateSnapshot::default(),
        }
    }

    async fn refresh_snapshot(&mut self) {
        let state = self.state.read().await;
        self.snap = StateSnapshot {
            active_workspace: state.active_workspace.clone(),
            active_monitor: state.active_monitor.clone(),
            active_window: state.active_window.clone(),
            monitors: state.monitors.clone(),
            variables: state.variables.clone(),
            version: state.compositor_version,
        };
    }

    /// Windowrule class matcher, depending on the compositor version.
    fn classify(&self, class: &str) -> String {
        if self.snap.version > VersionInfo::new(0, 47, 2) {
            format!("class:{class}")
        } else {
            format!("^({class})$")
        }
    }

    fn cancel_hysteresis(&mut self, uid: &str) -> bool {
        if let Some(task) = self.hysteresis_tasks.remove(uid) {
            task.abort();
            debug!("Canceled previous task for {uid}");
            true
        } else {
            false
        }
    }

    fn schedule_autohide(&mut self, uid: &str, delay: f64) {
        self.cancel_hysteresis(uid);
        let queue = self.self_queue.clone();
        let uid_owned = uid.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            let _ = queue.send(Some(Job {
                handler: AUTOHIDE_HANDLER.to_string(),
                args: uid_owned,
                respond: None,
            }));
        });
        self.hysteresis_tasks.insert(uid.to_string(), task);
    }

    async fn handle_autohide(&mut self, uid: &str) -> Result<()> {
        self.hysteresis_tasks.remove(uid);
        let still_visible = self.scratches.get(uid).is_some_and(|s| s.visible);
        if still_visible {
            debug!("hide {uid} because another client is active");
            self.run_hide(uid, HideFlavors::AUTOHIDE).await?;
        }
        Ok(())
    }

    // Commands

    async fn run_toggle(&mut self, args: &str) -> Result<()> {
        let uids: Vec<String> = args.split_whitespace().map(str::to_string).collect();
        if uids.is_empty() {
            let _ = self
                .backend
                .notify_error("toggle requires a scratchpad name")
                .await;
            return Ok(());
        }
        for uid in &uids {
            self.cancel_hysteresis(uid);
        }

        let Some(first) = self.scratches.get(&uids[0]) else {
            warn!("{} doesn't exist, can't toggle.", uids[0]);
            let _ = self
                .backend
                .notify_error(&format!(
                    "Scratchpad '{}' not found, check your configuration & the toggle parameter",
                    uids[0]
                ))
                .await;
            return Ok(());
        };

        let mon = self.snap.active_monitor.clone();
        let space_identifier = first.meta.space_identifier.clone();
        let alt_toggle = first.conf.get_bool("alt_toggle", &mon, false);
        let forced = first.forced_monitor(&self.snap.monitors, &mon).is_some();
        let first_visible = first.visible;
        debug!(
            "visibility_check: {space_identifier:?} == ({}, {mon})",
            self.snap.active_workspace
        );

        let extra_visibility_check = if alt_toggle {
            // Visible on any monitor, as long as the workspace matches.
            let monitors = self.backend.get_monitors(false).await?;
            helpers::all_space_identifiers(&monitors).contains(&space_identifier)
        } else {
            // Must be on the active monitor + workspace.
            space_identifier == (self.snap.active_workspace.clone(), mon)
        };

        let is_visible = first_visible && (forced || extra_visibility_check);

        for uid in &uids {
            if !self.scratches.contains(uid) {
                warn!("{uid} is not configured");
                continue;
            }
            debug!("{uid} visibility: {is_visible}");
            if is_visible && self.is_alive(uid).await {
                self.run_hide(uid, HideFlavors::default()).await?;
            } else {
                self.run_show(uid).await?;
            }
        }
        Ok(())
    }

    async fn run_attach(&mut self) -> Result<()> {
        let Some(uid) = self.last_focused.clone() else {
            let _ = self.backend.notify_error("No scratchpad was focused").await;
            return Ok(());
        };
        let focused = self.snap.active_window.clone();
        let (full_address, visible, pinned) = {
            let Some(scratch) = self.scratches.get(&uid) else {
                return Ok(());
            };
            (
                scratch.full_address(),
                scratch.visible,
                scratch
                    .conf
                    .get_bool("pinned", &self.snap.active_monitor, true),
            )
        };
        if focused == full_address {
            let _ = self
                .backend
                .notify_info("Scratch can't attach to itself")
                .await;
            return Ok(());
        }
        if !visible {
            self.run_show(&uid).await?;
        }

        if let Some(scratch) = self.scratches.get_mut(&uid) {
            if scratch.extra_addr.contains(&focused) {
                scratch.extra_addr.remove(&focused);
            } else {
                scratch.extra_addr.insert(focused.clone());
            }
        }

        if pinned {
            self.backend.pin_window(&focused).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for ScratchpadsPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn environments(&self) -> &'static [Environment] {
        &[Environment::Hyprland]
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

    fn validate_config(&self, section: &serde_json::Map<String, Value>) -> Vec<String> {
        let mut errors = Vec::new();
        for (uid, sub) in section {
            if let Some(sub) = sub.as_object() {
                errors.extend(validate_scratchpad_config(uid, sub));
            }
        }
        errors
    }

    async fn on_reload(&mut self, _reason: ReloadReason) -> Result<()> {
        self.refresh_snapshot().await;

        // Duplicated classes would make window matching ambiguous.
        let mut classes: HashMap<String, String> = HashMap::new();
        for (uid, sub) in self.config.iter_subsections() {
            let Some(class) = sub.get("class").and_then(Value::as_str) else {
                continue;
            };
            if class.is_empty() {
                continue;
            }
            if let Some(other) = classes.get(class) {
                let text =
                    format!("Scratch class {class} is duplicated (in {uid} and {other})");
                error!("{text}");
                let _ = self.backend.notify_error(&text).await;
            } else {
                classes.insert(class.to_string(), uid.clone());
            }
        }

        let full = self.config.raw().clone();
        let configured: Vec<String> = full
            .iter()
            .filter(|(_, v)| v.is_object())
            .map(|(k, _)| k.clone())
            .collect();

        // Drop scratchpads removed from the configuration.
        for uid in self.scratches.uids() {
            if !configured.contains(&uid) {
                info!("Dropping scratchpad {uid}");
                self.cancel_hysteresis(&uid);
                self.scratches.remove(&uid);
                if let Some(mut child) = self.procs.remove(&uid) {
                    let _ = child.start_kill();
                }
            }
        }

        let mut to_spawn = Vec::new();
        for uid in &configured {
            if self.scratches.contains(uid) {
                if let Some(scratch) = self.scratches.get_mut(uid) {
                    scratch.set_config(&full, self.snap.version);
                }
            } else {
                let scratch = Scratch::new(uid, &full, self.snap.version);
                let lazy = scratch.conf.get_bool("lazy", "", true);
                self.scratches.insert(scratch);
                if !lazy {
                    to_spawn.push(uid.clone());
                }
            }
        }

        for uid in to_spawn {
            if self.ensure_alive(&uid).await? {
                if let Some(scratch) = self.scratches.get_mut(&uid) {
                    scratch.meta.should_hide = true;
                }
            } else {
                error!("Failure starting {uid}");
            }
        }

        self.scratches.clear_state_all("configured");
        Ok(())
    }

    async fn on_event(&mut self, handler: &str, payload: &str) -> Result<()> {
        self.refresh_snapshot().await;
        match handler {
            "event_activewindowv2" => self.event_activewindowv2(payload).await,
            "event_openwindow" => self.event_openwindow(payload).await,
            "event_closewindow" => self.event_closewindow(payload),
            "event_workspace" => self.event_workspace(payload),
            "event_monitorremoved" => self.event_monitorremoved(payload).await,
            "event_configreloaded" => self.event_configreloaded().await,
            "event_changefloatingmode" => self.event_changefloatingmode(payload),
            AUTOHIDE_HANDLER => self.handle_autohide(payload).await,
            _ => Ok(()),
        }
    }

    async fn on_command(&mut self, command: &str, args: &str) -> Result<Option<String>> {
        self.refresh_snapshot().await;
        match command {
            "toggle" => self.run_toggle(args).await?,
            "show" => self.run_show(args.trim()).await?,
            "hide" => self.run_hide(args.trim(), HideFlavors::default()).await?,
            "attach" => self.run_attach().await?,
            _ => {
                return Err(Error::Handler {
                    plugin: self.name.clone(),
                    handler: format!("run_{command}"),
                    message: "unknown command".into(),
                });
            }
        }
        Ok(None)
    }

    async fn exit(&mut self) -> Result<()> {
        self.shutdown_processes().await;
        Ok(())
    }
}
