//! Per-plugin backend façade.
//!
//! Each plugin gets its own proxy over the one shared backend so every
//! backend operation is logged with the calling plugin's name attached.
//! The proxy is the only backend surface plugins see.

use std::sync::Arc;

use pypr_types::{ClientInfo, Environment, MonitorInfo};
use serde_json::Value;
use tracing::debug;

use super::{
    Backend, DEFAULT_NOTIFICATION_DURATION_MS, ERROR_NOTIFICATION_DURATION_MS, NotifyKind,
    get_client_by_addr,
};
use crate::error::Result;

#[derive(Clone)]
pub struct BackendProxy {
    backend: Arc<dyn Backend>,
    plugin: Arc<str>,
}

impl BackendProxy {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, plugin: &str) -> Self {
        Self {
            backend,
            plugin: Arc::from(plugin),
        }
    }

    #[must_use]
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.backend.environment()
    }

    /// Dispatch one command.
    pub async fn execute(&self, command: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "dispatch {command}");
        self.backend.execute(command, "dispatch", false).await
    }

    /// Dispatch with a custom base command or weak failure logging.
    pub async fn execute_with(&self, command: &str, base_command: &str, weak: bool) -> Result<bool> {
        debug!(plugin = %self.plugin, "{base_command} {command}");
        self.backend.execute(command, base_command, weak).await
    }

    pub async fn execute_many(&self, commands: &[String], weak: bool) -> Result<bool> {
        debug!(plugin = %self.plugin, "batch {commands:?}");
        self.backend.execute_many(commands, weak).await
    }

    pub async fn execute_json(&self, command: &str) -> Result<Value> {
        debug!(plugin = %self.plugin, "query {command}");
        self.backend.execute_json(command).await
    }

    pub async fn execute_batch(&self, commands: &[String]) -> Result<()> {
        debug!(plugin = %self.plugin, "fire-and-forget batch {commands:?}");
        self.backend.execute_batch(commands).await
    }

    pub async fn execute_action(&self, action: Value) -> Result<bool> {
        debug!(plugin = %self.plugin, "action {action}");
        self.backend.execute_action(action).await
    }

    pub async fn get_clients(
        &self,
        mapped: bool,
        workspace: Option<&str>,
        workspace_bl: Option<&str>,
    ) -> Result<Vec<ClientInfo>> {
        self.backend.get_clients(mapped, workspace, workspace_bl).await
    }

    pub async fn get_monitors(&self, include_disabled: bool) -> Result<Vec<MonitorInfo>> {
        self.backend.get_monitors(include_disabled).await
    }

    pub async fn get_monitor_props(
        &self,
        name: Option<&str>,
        include_disabled: bool,
    ) -> Result<MonitorInfo> {
        self.backend.get_monitor_props(name, include_disabled).await
    }

    pub async fn get_client_by_addr(
        &self,
        address: &str,
        clients: Option<&[ClientInfo]>,
    ) -> Result<Option<ClientInfo>> {
        get_client_by_addr(self.backend.as_ref(), address, clients).await
    }

    pub async fn notify(&self, message: &str, duration_ms: u64) -> Result<()> {
        debug!(plugin = %self.plugin, "notify: {message}");
        self.backend
            .notify(message, duration_ms, NotifyKind::Default)
            .await
    }

    pub async fn notify_info(&self, message: &str) -> Result<()> {
        debug!(plugin = %self.plugin, "notify_info: {message}");
        self.backend
            .notify(message, DEFAULT_NOTIFICATION_DURATION_MS, NotifyKind::Info)
            .await
    }

    pub async fn notify_error(&self, message: &str) -> Result<()> {
        debug!(plugin = %self.plugin, "notify_error: {message}");
        self.backend
            .notify(message, ERROR_NOTIFICATION_DURATION_MS, NotifyKind::Error)
            .await
    }

    #[must_use]
    pub fn parse_event(&self, raw: &str) -> Option<(String, String)> {
        self.backend.parse_event(raw)
    }

    #[must_use]
    pub fn supports_events(&self) -> bool {
        self.backend.supports_events()
    }

    pub async fn open_event_stream(&self) -> Result<tokio::net::UnixStream> {
        self.backend.open_event_stream().await
    }

    pub async fn focus_window(&self, address: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "focus_window {address}");
        self.backend.focus_window(address).await
    }

    pub async fn move_window_to_workspace(
        &self,
        address: &str,
        workspace: &str,
        silent: bool,
    ) -> Result<bool> {
        debug!(plugin = %self.plugin, "move_window_to_workspace {address} -> {workspace}");
        self.backend
            .move_window_to_workspace(address, workspace, silent)
            .await
    }

    pub async fn pin_window(&self, address: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "pin_window {address}");
        self.backend.pin_window(address).await
    }

    pub async fn close_window(&self, address: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "close_window {address}");
        self.backend.close_window(address).await
    }

    pub async fn resize_window(&self, address: &str, width: i32, height: i32) -> Result<bool> {
        debug!(plugin = %self.plugin, "resize_window {address} {width}x{height}");
        self.backend.resize_window(address, width, height).await
    }

    pub async fn move_window(&self, address: &str, x: i32, y: i32) -> Result<bool> {
        debug!(plugin = %self.plugin, "move_window {address} to {x},{y}");
        self.backend.move_window(address, x, y).await
    }

    pub async fn toggle_floating(&self, address: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "toggle_floating {address}");
        self.backend.toggle_floating(address).await
    }

    pub async fn set_keyword(&self, keyword_command: &str) -> Result<bool> {
        debug!(plugin = %self.plugin, "keyword {keyword_command}");
        self.backend.set_keyword(keyword_command).await
    }
}
