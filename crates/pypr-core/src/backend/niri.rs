//! Niri backend.
//!
//! One JSON request/response socket (`NIRI_SOCKET`); replies are wrapped in
//! an `{"Ok": …}` envelope. The event stream is the same socket after an
//! `"EventStream"` request; event lines are JSON objects
//! `{"Variant": {"type": X, …}}` routed to `niri_<x>` handlers.

use std::path::PathBuf;

use async_trait::async_trait;
use pypr_types::{ClientInfo, Environment, MonitorInfo, WorkspaceRef};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, error, warn};

use super::{Backend, NotifyKind, notify_send};
use crate::error::{Error, Result};

pub struct NiriBackend {
    socket: PathBuf,
}

impl NiriBackend {
    /// Build from `NIRI_SOCKET`.
    ///
    /// # Errors
    ///
    /// Returns `NoBackend` when the variable is not set.
    pub fn from_env() -> Result<Self> {
        let socket = std::env::var("NIRI_SOCKET").map_err(|_| Error::NoBackend)?;
        Ok(Self {
            socket: PathBuf::from(socket),
        })
    }

    async fn request(&self, request: &Value) -> Result<Value> {
        let mut stream = UnixStream::connect(&self.socket).await?;
        let mut payload = serde_json::to_string(request)?;
        payload.push('\n');
        stream.write_all(payload.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(serde_json::from_str(&line)?)
    }

    /// Unwrap the `{"Ok": {...}}` envelope, flattening a single-keyed
    /// payload object (`{"Ok": {"Windows": [...]}}` yields the array).
    fn unwrap_ok(response: Value) -> Result<Value> {
        let Some(ok) = response.get("Ok") else {
            return Err(Error::Backend(format!("Niri command failed: {response}")));
        };
        if let Some(obj) = ok.as_object() {
            if obj.len() == 1 {
                return Ok(obj.values().next().cloned().unwrap_or(Value::Null));
            }
        }
        Ok(ok.clone())
    }

    fn map_client(window: &Value) -> ClientInfo {
        ClientInfo {
            address: window
                .get("id")
                .map(ToString::to_string)
                .unwrap_or_default(),
            class: window
                .get("app_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: window
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            initial_class: window
                .get("app_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            initial_title: window
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            workspace: WorkspaceRef {
                id: window.get("workspace_id").and_then(Value::as_i64).unwrap_or(0),
                name: window
                    .get("workspace_id")
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            },
            pid: window.get("pid").and_then(Value::as_i64).unwrap_or(-1),
            mapped: window
                .get("is_mapped")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            ..ClientInfo::default()
        }
    }

    fn map_monitor(name: &str, output: &Value) -> MonitorInfo {
        let logical = output.get("logical").filter(|v| v.is_object());
        let get_i32 = |obj: Option<&Value>, key: &str| {
            obj.and_then(|v| v.get(key))
                .and_then(Value::as_i64)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0)
        };
        let make = output.get("make").and_then(Value::as_str).unwrap_or("");
        let model = output.get("model").and_then(Value::as_str).unwrap_or("");
        let serial = output.get("serial").and_then(Value::as_str).unwrap_or("");
        let description = format!("{make} {model} {serial}").trim().to_string();

        MonitorInfo {
            id: -1,
            name: name.to_string(),
            description: if description.is_empty() {
                name.to_string()
            } else {
                description
            },
            x: get_i32(logical, "x"),
            y: get_i32(logical, "y"),
            width: get_i32(logical, "width"),
            height: get_i32(logical, "height"),
            scale: logical
                .and_then(|v| v.get("scale"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            transform: 0,
            focused: output
                .get("is_focused")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            disabled: output.get("current_mode").is_some_and(Value::is_null),
            ..MonitorInfo::default()
        }
    }

    fn query_request(command: &str) -> Result<Value> {
        match command.split_whitespace().next().unwrap_or("") {
            "windows" | "clients" => Ok(json!("Windows")),
            "outputs" | "monitors" => Ok(json!("Outputs")),
            "version" => Ok(json!("Version")),
            "workspaces" => Ok(json!("Workspaces")),
            other => Err(Error::Backend(format!("unsupported Niri query: {other}"))),
        }
    }
}

#[async_trait]
impl Backend for NiriBackend {
    fn environment(&self) -> Environment {
        Environment::Niri
    }

    async fn get_clients(
        &self,
        mapped: bool,
        workspace: Option<&str>,
        workspace_bl: Option<&str>,
    ) -> Result<Vec<ClientInfo>> {
        let windows = self.execute_json("windows").await?;
        let windows = windows.as_array().cloned().unwrap_or_default();
        Ok(windows
            .iter()
            .map(Self::map_client)
            .filter(|c| {
                (!mapped || c.mapped)
                    && workspace.is_none_or(|w| c.workspace.name == w)
                    && workspace_bl.is_none_or(|w| c.workspace.name != w)
            })
            .collect())
    }

    async fn get_monitors(&self, include_disabled: bool) -> Result<Vec<MonitorInfo>> {
        let outputs = self.execute_json("outputs").await?;
        let outputs = outputs.as_object().cloned().unwrap_or_default();
        Ok(outputs
            .iter()
            .map(|(name, output)| Self::map_monitor(name, output))
            .filter(|m| include_disabled || !m.disabled)
            .collect())
    }

    async fn execute(&self, command: &str, _base_command: &str, weak: bool) -> Result<bool> {
        // Plain string commands map to argument-less actions.
        let response = self
            .request(&json!({"Action": {command: {}}}))
            .await?;
        let ok = response.get("Ok").is_some();
        if !ok {
            if weak {
                warn!("Niri command failed: {response}");
            } else {
                error!("Niri command failed: {response}");
            }
        }
        Ok(ok)
    }

    async fn execute_many(&self, commands: &[String], weak: bool) -> Result<bool> {
        // No batch support in the Niri protocol.
        let mut all_ok = true;
        for command in commands {
            all_ok &= self.execute(command, "dispatch", weak).await?;
        }
        Ok(all_ok)
    }

    async fn execute_json(&self, command: &str) -> Result<Value> {
        let request = Self::query_request(command)?;
        let response = self.request(&request).await?;
        Self::unwrap_ok(response)
    }

    async fn execute_batch(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            let _ = self.execute(command, "dispatch", true).await;
        }
        Ok(())
    }

    async fn execute_action(&self, action: Value) -> Result<bool> {
        debug!("Niri action: {action}");
        let response = self.request(&json!({"Action": action})).await?;
        Ok(response.get("Ok").is_some())
    }

    async fn notify(&self, message: &str, duration_ms: u64, _kind: NotifyKind) -> Result<()> {
        // Niri has no native notification path.
        notify_send(message, duration_ms).await;
        Ok(())
    }

    fn parse_event(&self, raw: &str) -> Option<(String, String)> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let event: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!("Invalid JSON event: {e}: {trimmed}");
                return None;
            }
        };
        let variant = event.get("Variant")?;
        let type_name = variant.get("type")?.as_str()?;
        Some((
            format!("niri_{}", type_name.to_lowercase()),
            variant.to_string(),
        ))
    }

    async fn open_event_stream(&self) -> Result<UnixStream> {
        let mut stream = UnixStream::connect(&self.socket).await?;
        stream.write_all(b"\"EventStream\"\n").await?;
        Ok(stream)
    }

    async fn focus_window(&self, address: &str) -> Result<bool> {
        let Ok(id) = address.parse::<u64>() else {
            return Ok(false);
        };
        self.execute_action(json!({"FocusWindow": {"id": id}})).await
    }

    async fn close_window(&self, address: &str) -> Result<bool> {
        let Ok(id) = address.parse::<u64>() else {
            return Ok(false);
        };
        self.execute_action(json!({"CloseWindow": {"id": id}})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> NiriBackend {
        NiriBackend {
            socket: PathBuf::from("/tmp/niri.sock"),
        }
    }

    #[test]
    fn test_parse_event_variant() {
        let b = backend();
        let line = r#"{"Variant": {"type": "OutputsChanged", "outputs": {}}}"#;
        let (name, payload) = b.parse_event(line).unwrap();
        assert_eq!(name, "niri_outputschanged");
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "OutputsChanged");
    }

    #[test]
    fn test_parse_event_ignores_non_variant() {
        let b = backend();
        assert!(b.parse_event(r#"{"Ok": "Handled"}"#).is_none());
        assert!(b.parse_event("plain text").is_none());
    }

    #[test]
    fn test_unwrap_ok_flattens_single_key() {
        let resp = json!({"Ok": {"Windows": [1, 2]}});
        assert_eq!(NiriBackend::unwrap_ok(resp).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_unwrap_ok_err_envelope() {
        let resp = json!({"Err": "nope"});
        assert!(NiriBackend::unwrap_ok(resp).is_err());
    }

    #[test]
    fn test_map_client() {
        let window = json!({
            "id": 7,
            "app_id": "firefox",
            "title": "Mozilla Firefox",
            "workspace_id": 2,
            "pid": 1234,
        });
        let client = NiriBackend::map_client(&window);
        assert_eq!(client.address, "7");
        assert_eq!(client.class, "firefox");
        assert_eq!(client.workspace.name, "2");
        assert_eq!(client.pid, 1234);
        assert!(client.mapped);
    }

    #[test]
    fn test_map_monitor() {
        let output = json!({
            "make": "Dell Inc.",
            "model": "U2415",
            "serial": "ABC123",
            "is_focused": true,
            "current_mode": 1,
            "logical": {"x": 1920, "y": 0, "width": 1920, "height": 1200, "scale": 1.0},
        });
        let mon = NiriBackend::map_monitor("DP-3", &output);
        assert_eq!(mon.name, "DP-3");
        assert_eq!(mon.x, 1920);
        assert_eq!(mon.width, 1920);
        assert!(mon.focused);
        assert!(!mon.disabled);
        assert!(mon.description.contains("U2415"));
    }

    #[test]
    fn test_query_request_mapping() {
        assert_eq!(NiriBackend::query_request("windows").unwrap(), json!("Windows"));
        assert_eq!(NiriBackend::query_request("outputs").unwrap(), json!("Outputs"));
        assert!(NiriBackend::query_request("activeworkspace").is_err());
    }
}
