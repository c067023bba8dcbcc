//! Plugin interface and built-in plugins.
//!
//! Plugins declare their handlers in static tables (`event_handlers`,
//! `commands`) instead of being discovered by reflection; the dispatcher
//! indexes those tables once at load time.

pub mod core;
pub mod magnify;
pub mod monitors;
pub mod scratchpads;

use async_trait::async_trait;
use pypr_core::Result;
use pypr_core::backend::proxy::BackendProxy;
use pypr_core::config::{ConfigView, Schema, Validator};
use pypr_core::state::SharedStateRef;
use pypr_types::Environment;
use tokio::sync::{mpsc, oneshot};

/// Why `on_reload` is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    Init,
    Reload,
}

/// One unit of work queued to a plugin runner.
pub struct Job {
    /// Full handler name (`run_toggle`, `event_workspace`, `_autohide`, …).
    pub handler: String,
    pub args: String,
    /// Present for commands awaiting a result.
    pub respond: Option<oneshot::Sender<(bool, String)>>,
}

/// Queue item; `None` is the poison value terminating the runner.
pub type QueueItem = Option<Job>;

/// Static description of a command exposed by a plugin.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Bracketed argument spec, e.g. `"<name>"` or `"[factor]"`.
    pub args: &'static str,
    pub short: &'static str,
    pub detail: &'static str,
}

/// Everything a plugin receives at construction time.
#[derive(Clone)]
pub struct PluginCtx {
    pub name: String,
    pub state: SharedStateRef,
    pub backend: BackendProxy,
    /// The plugin's own queue, for self-scheduled work (hysteresis,
    /// debounced relayouts).
    pub self_queue: mpsc::UnboundedSender<QueueItem>,
}

#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Environments the plugin supports; empty means all.
    fn environments(&self) -> &'static [Environment] {
        &[]
    }

    fn schema(&self) -> Option<&'static Schema> {
        None
    }

    /// Full handler names this plugin reacts to (`event_*`, `niri_*`).
    fn event_handlers(&self) -> &'static [&'static str] {
        &[]
    }

    fn commands(&self) -> &'static [CommandSpec] {
        &[]
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Install the plugin's config subtree (wrapped with its schema).
    fn load_config(&mut self, view: ConfigView);

    /// Validate the raw config section; the default checks the schema.
    fn validate_config(&self, section: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
        let Some(schema) = self.schema() else {
            return Vec::new();
        };
        let validator = Validator::new(section, self.name());
        let mut errors = validator.validate(schema);
        errors.extend(validator.warn_unknown_keys(schema));
        errors
    }

    async fn on_reload(&mut self, reason: ReloadReason) -> Result<()> {
        let _ = reason;
        Ok(())
    }

    /// Handle one event; `handler` is the full handler name.
    async fn on_event(&mut self, handler: &str, payload: &str) -> Result<()> {
        let _ = (handler, payload);
        Ok(())
    }

    /// Handle one command; returns an optional response body.
    async fn on_command(&mut self, command: &str, args: &str) -> Result<Option<String>> {
        let _ = (command, args);
        Ok(None)
    }

    async fn exit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Instantiate a built-in plugin by name.
///
/// Python pyprland resolves plugin modules dynamically; a compiled daemon
/// uses this factory table instead.
#[must_use]
pub fn instantiate(name: &str, ctx: PluginCtx) -> Option<Box<dyn Plugin>> {
    match name {
        "pyprland" => Some(Box::new(core::CorePlugin::new(ctx))),
        "scratchpads" => Some(Box::new(scratchpads::ScratchpadsPlugin::new(ctx))),
        "monitors" => Some(Box::new(monitors::MonitorsPlugin::new(ctx))),
        "magnify" => Some(Box::new(magnify::MagnifyPlugin::new(ctx))),
        _ => None,
    }
}
