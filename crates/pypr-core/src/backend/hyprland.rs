//! Hyprland backend.
//!
//! Commands go through the per-request `.socket.sock` connection; events
//! arrive on the long-lived `.socket2.sock` stream. A dispatch is
//! `/dispatch …`, a JSON query `-j/…`, a batch `[[BATCH]] a ; b ; …`, and a
//! successful response is `ok` repeated once per command.

use std::path::PathBuf;

use async_trait::async_trait;
use pypr_types::{ClientInfo, Environment, MonitorInfo};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, error, warn};

use super::{Backend, NotifyKind, forced_notify_send, notify_send};
use crate::error::{Error, Result};
use crate::paths;

pub struct HyprlandBackend {
    ctl_socket: PathBuf,
    event_socket: PathBuf,
}

impl HyprlandBackend {
    /// Build from `HYPRLAND_INSTANCE_SIGNATURE`.
    ///
    /// # Errors
    ///
    /// Returns `NoBackend` when the signature is not set.
    pub fn from_env() -> Result<Self> {
        let dir = paths::hyprland_ipc_dir().ok_or(Error::NoBackend)?;
        Ok(Self {
            ctl_socket: dir.join(".socket.sock"),
            event_socket: dir.join(".socket2.sock"),
        })
    }

    /// Send a raw request and read the full response.
    ///
    /// Retries once when the compositor resets the connection mid-request.
    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut last_err = None;
        for attempt in 0..2 {
            match self.request_once(payload).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let reset = matches!(
                        &e,
                        Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionReset
                    );
                    if reset && attempt == 0 {
                        debug!("Connection reset, retrying request once");
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(Error::Backend("hyprctl request failed".into())))
    }

    async fn request_once(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.ctl_socket).await?;
        stream.write_all(payload).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }

    fn check_ok(response: &[u8], nb_commands: usize, weak: bool, sent: &str) -> bool {
        let flattened: Vec<u8> = response
            .iter()
            .copied()
            .filter(|&b| b != b'\n')
            .collect();
        let ok = flattened == b"ok".repeat(nb_commands);
        if !ok {
            let text = String::from_utf8_lossy(response);
            if weak {
                warn!("FAILED {sent}: {text}");
            } else {
                error!("FAILED {sent}: {text}");
            }
        }
        ok
    }

    fn batch_payload(commands: &[String], base_command: &str) -> String {
        let formatted: Vec<String> = commands
            .iter()
            .map(|c| format!("{base_command} {c}"))
            .collect();
        format!("[[BATCH]] {}", formatted.join(" ; "))
    }
}

#[async_trait]
impl Backend for HyprlandBackend {
    fn environment(&self) -> Environment {
        Environment::Hyprland
    }

    async fn get_clients(
        &self,
        mapped: bool,
        workspace: Option<&str>,
        workspace_bl: Option<&str>,
    ) -> Result<Vec<ClientInfo>> {
        let raw = self.execute_json("clients").await?;
        let clients: Vec<ClientInfo> = serde_json::from_value(raw)?;
        Ok(clients
            .into_iter()
            .filter(|c| {
                (!mapped || c.mapped)
                    && workspace.is_none_or(|w| c.workspace.name == w)
                    && workspace_bl.is_none_or(|w| c.workspace.name != w)
            })
            .collect())
    }

    async fn get_monitors(&self, include_disabled: bool) -> Result<Vec<MonitorInfo>> {
        let command = if include_disabled {
            "monitors all"
        } else {
            "monitors"
        };
        let raw = self.execute_json(command).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn execute(&self, command: &str, base_command: &str, weak: bool) -> Result<bool> {
        if command.is_empty() {
            warn!("{base_command} triggered without a command!");
            return Ok(false);
        }
        debug!("{base_command} {command}");
        let payload = format!("/{base_command} {command}");
        let response = self.request(payload.as_bytes()).await?;
        Ok(Self::check_ok(&response, 1, weak, command))
    }

    async fn execute_many(&self, commands: &[String], weak: bool) -> Result<bool> {
        if commands.is_empty() {
            return Ok(true);
        }
        debug!("Batch {commands:?}");
        let payload = Self::batch_payload(commands, "dispatch");
        let response = self.request(payload.as_bytes()).await?;
        Ok(Self::check_ok(&response, commands.len(), weak, &payload))
    }

    async fn execute_json(&self, command: &str) -> Result<Value> {
        let payload = format!("-j/{command}");
        let response = self.request(payload.as_bytes()).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    async fn execute_batch(&self, commands: &[String]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        debug!("Batch {commands:?}");
        let payload = Self::batch_payload(commands, "dispatch");
        // Fire and forget: the response is not awaited beyond the write.
        let mut stream = UnixStream::connect(&self.ctl_socket).await?;
        stream.write_all(payload.as_bytes()).await?;
        Ok(())
    }

    async fn notify(&self, message: &str, duration_ms: u64, kind: NotifyKind) -> Result<()> {
        if forced_notify_send() {
            notify_send(message, duration_ms).await;
            return Ok(());
        }
        let (icon, color) = match kind {
            NotifyKind::Default => (-1, "ff1010"),
            NotifyKind::Info => (1, "1010ff"),
            NotifyKind::Error => (0, "ff1010"),
        };
        self.execute(
            &format!("{icon} {duration_ms} rgb({color})  {message}"),
            "notify",
            false,
        )
        .await?;
        Ok(())
    }

    fn parse_event(&self, raw: &str) -> Option<(String, String)> {
        let (name, payload) = raw.split_once(">>")?;
        Some((
            format!("event_{name}"),
            payload.trim_end_matches('\n').to_string(),
        ))
    }

    async fn open_event_stream(&self) -> Result<UnixStream> {
        Ok(UnixStream::connect(&self.event_socket).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HyprlandBackend {
        HyprlandBackend {
            ctl_socket: PathBuf::from("/tmp/test/.socket.sock"),
            event_socket: PathBuf::from("/tmp/test/.socket2.sock"),
        }
    }

    #[test]
    fn test_parse_event() {
        let b = backend();
        assert_eq!(
            b.parse_event("activewindowv2>>abcdef1234567890\n"),
            Some((
                "event_activewindowv2".to_string(),
                "abcdef1234567890".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_event_payload_may_contain_separator_chars() {
        let b = backend();
        assert_eq!(
            b.parse_event("focusedmon>>DP-1,3\n"),
            Some(("event_focusedmon".to_string(), "DP-1,3".to_string()))
        );
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        let b = backend();
        assert!(b.parse_event("no separator here").is_none());
    }

    #[test]
    fn test_check_ok_single() {
        assert!(HyprlandBackend::check_ok(b"ok", 1, false, "x"));
        assert!(!HyprlandBackend::check_ok(b"Invalid dispatcher", 1, true, "x"));
    }

    #[test]
    fn test_check_ok_batch_counts_commands() {
        assert!(HyprlandBackend::check_ok(b"ok\nok\nok", 3, false, "x"));
        assert!(!HyprlandBackend::check_ok(b"ok\nok", 3, true, "x"));
    }

    #[test]
    fn test_batch_payload_format() {
        let commands = vec!["focuswindow address:0x1".to_string(), "pin address:0x1".to_string()];
        assert_eq!(
            HyprlandBackend::batch_payload(&commands, "dispatch"),
            "[[BATCH]] dispatch focuswindow address:0x1 ; dispatch pin address:0x1"
        );
    }
}
