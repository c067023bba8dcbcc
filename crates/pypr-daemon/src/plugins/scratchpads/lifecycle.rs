//! Scratchpad process lifecycle: spawning, liveness, windowrules.

use std::time::Duration;

use pypr_core::units::convert_coords;
use pypr_core::variables::apply_variables;
use pypr_core::{Error, Result};
use tracing::{error, info, warn};

use super::ScratchpadsPlugin;
use super::helpers::mk_scratch_name;

/// Poll intervals while waiting for a spawned client window.
fn wait_intervals() -> impl Iterator<Item = Duration> {
    std::iter::repeat_n(Duration::from_millis(100), 10)
        .chain(std::iter::repeat_n(Duration::from_millis(200), 20))
        .chain(std::iter::repeat_n(Duration::from_millis(500), 15))
}

impl ScratchpadsPlugin {
    /// Is the scratchpad's process (or window, for untracked ones) alive?
    pub(super) async fn is_alive(&self, uid: &str) -> bool {
        let Some(scratch) = self.scratches.get(uid) else {
            return false;
        };
        let mon = &self.snap.active_monitor;
        if !scratch.have_command(mon) {
            return true;
        }
        if scratch.conf.get_bool("process_tracking", mon, true) {
            return process_is_alive(scratch.pid).await;
        }
        if scratch.meta.no_pid {
            let Ok(clients) = self.backend.get_clients(false, None, None).await else {
                return false;
            };
            return scratch.find_client(&clients).is_some();
        }
        false
    }

    /// Ensure the scratchpad is started; returns true on success.
    pub(super) async fn ensure_alive(&mut self, uid: &str) -> Result<bool> {
        let mon = self.snap.active_monitor.clone();
        let (have_command, process_tracking) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(false);
            };
            (
                scratch.have_command(&mon),
                scratch.conf.get_bool("process_tracking", &mon, true),
            )
        };

        if !have_command {
            return Ok(true);
        }

        if process_tracking {
            if !self.is_alive(uid).await {
                self.configure_windowrules(uid).await?;
                info!("{uid} is not running, starting...");
                if !self.start_scratch(uid).await? {
                    let _ = self
                        .backend
                        .notify_error(&format!("Failed to show scratch \"{uid}\""))
                        .await;
                    return Ok(false);
                }
            }
            self.unset_windowrules(uid).await?;
            return Ok(true);
        }

        self.start_scratch_nopid(uid).await
    }

    /// Spawn + wait for the window, tracked by pid.
    async fn start_scratch(&mut self, uid: &str) -> Result<bool> {
        if let Some(child) = self.procs.get_mut(uid) {
            let _ = child.start_kill();
        }
        self.scratches.unregister(uid);
        self.start_scratch_command(uid).await?;
        info!("starting {uid}");

        if self.wait_for_client(uid, true).await? {
            return Ok(true);
        }

        let pid = self.scratches.get(uid).map_or(-1, |s| s.pid);
        error!("Failed spawning {uid} as proc {pid}");
        let spawn_error = if self.is_alive(uid).await {
            "The command didn't open a window".to_string()
        } else if let Some(mut child) = self.procs.remove(uid) {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    format!("The command failed with code {}", status.code().unwrap_or(-1))
                }
                _ => "The command terminated successfully, is it already running?".to_string(),
            }
        } else {
            "The command could not be started".to_string()
        };
        let command = self
            .scratches
            .get(uid)
            .map(|s| s.conf.get_str("command", &self.snap.active_monitor))
            .unwrap_or_default();
        error!("\"{command}\": {spawn_error}");
        let _ = self.backend.notify_error(&spawn_error).await;
        Ok(false)
    }

    /// Spawn + wait for the window, tracked only by window matching.
    async fn start_scratch_nopid(&mut self, uid: &str) -> Result<bool> {
        let started = self
            .scratches
            .get(uid)
            .is_some_and(|s| s.meta.no_pid)
            && self.is_alive(uid).await;
        if started {
            return Ok(true);
        }

        self.scratches.unregister(uid);
        self.start_scratch_command(uid).await?;
        let found = self.wait_for_client(uid, false).await?;
        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.meta.no_pid = found;
        }
        Ok(found)
    }

    /// Spawn the scratchpad's process through a shell.
    pub(super) async fn start_scratch_command(&mut self, uid: &str) -> Result<()> {
        self.scratches.set_state("respawned", uid);
        let old_pid = self
            .procs
            .get(uid)
            .and_then(tokio::process::Child::id)
            .map(i64::from);

        let raw_command = self
            .scratches
            .get(uid)
            .map(|s| s.conf.get_str("command", &self.snap.active_monitor))
            .unwrap_or_default();
        let command = apply_variables(&raw_command, &self.snap.variables);

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .spawn()
            .map_err(|e| Error::Backend(format!("Failed to spawn \"{command}\": {e}")))?;
        let pid = child.id().map(i64::from).unwrap_or(-1);
        self.procs.insert(uid.to_string(), child);

        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.reset(pid);
        }
        self.scratches.register_pid(uid, pid);
        info!("scratch {uid} ({command}) has pid {pid}");
        if let Some(old) = old_pid {
            self.scratches.clear_pid(old);
        }
        Ok(())
    }

    /// Poll the client list until the spawned window shows up.
    ///
    /// With `use_proc` the process's death aborts the wait early.
    pub(super) async fn wait_for_client(&mut self, uid: &str, use_proc: bool) -> Result<bool> {
        info!("==> Wait for {uid} spawning");
        for interval in wait_intervals() {
            tokio::time::sleep(interval).await;
            let alive = self.is_alive(uid).await;

            if alive || !use_proc {
                let clients = self.backend.get_clients(false, None, None).await?;
                let found = self
                    .scratches
                    .get(uid)
                    .and_then(|s| s.find_client(&clients))
                    .cloned();
                if let Some(client) = found {
                    if let Some(scratch) = self.scratches.get_mut(uid) {
                        info!(
                            "=> {uid} client (proc:{}, addr:{}) detected on time",
                            scratch.pid, client.address
                        );
                        scratch.client_info = Some(client);
                    }
                    self.scratches.reindex(uid);
                    self.scratches.clear_state("respawned", uid);
                    return Ok(true);
                }
            }
            if use_proc && !alive {
                return Ok(false);
            }
        }
        Ok(false)
    }

    /// Move the matched window onto its private special workspace.
    pub(super) async fn initialize_scratch(&mut self, uid: &str) -> Result<()> {
        let already = self
            .scratches
            .get(uid)
            .is_none_or(|s| s.meta.initialized);
        if already {
            return Ok(());
        }

        let have_command = self
            .scratches
            .get(uid)
            .is_some_and(|s| s.have_command(&self.snap.active_monitor));
        if have_command {
            self.update_client_info(uid, None, None).await?;
        } else {
            let clients = self.backend.get_clients(false, None, None).await?;
            let found = self
                .scratches
                .get(uid)
                .and_then(|s| s.find_client(&clients))
                .cloned();
            match found {
                Some(client) => {
                    if let Some(scratch) = self.scratches.get_mut(uid) {
                        scratch.client_info = Some(client);
                    }
                    self.scratches.reindex(uid);
                }
                None => {
                    return Err(Error::Backend(format!(
                        "couldn't find a matching client for {uid}"
                    )));
                }
            }
        }

        let address = self
            .scratches
            .get(uid)
            .map(|s| s.full_address())
            .unwrap_or_default();
        self.backend
            .move_window_to_workspace(&address, &mk_scratch_name(uid), true)
            .await?;
        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.meta.initialized = true;
        }
        Ok(())
    }

    /// Refresh the stored client record, from `client_info` when given,
    /// else from `clients` (or a fresh query) via address/rule matching.
    pub(super) async fn update_client_info(
        &mut self,
        uid: &str,
        client_info: Option<pypr_types::ClientInfo>,
        clients: Option<&[pypr_types::ClientInfo]>,
    ) -> Result<()> {
        let resolved = match client_info {
            Some(info) => Some(info),
            None => {
                let (have_command, address) = {
                    let Some(scratch) = self.scratches.get(uid) else {
                        return Ok(());
                    };
                    (
                        scratch.have_command(&self.snap.active_monitor),
                        scratch.full_address(),
                    )
                };
                if have_command && !address.is_empty() {
                    self.backend.get_client_by_addr(&address, clients).await?
                } else {
                    let fetched;
                    let list = match clients {
                        Some(list) => list,
                        None => {
                            fetched = self.backend.get_clients(false, None, None).await?;
                            &fetched
                        }
                    };
                    self.scratches
                        .get(uid)
                        .and_then(|s| s.find_client(list))
                        .cloned()
                }
            }
        };

        let Some(scratch) = self.scratches.get_mut(uid) else {
            return Ok(());
        };
        match resolved {
            Some(info) => {
                scratch.client_info = Some(info);
                self.scratches.reindex(uid);
                Ok(())
            }
            None => {
                let address = scratch.full_address();
                error!("The client window {address} vanished");
                Err(Error::Backend(format!("Client window {address} not found")))
            }
        }
    }

    // Windowrules

    /// Install windowrules so the window appears pre-sized, floating and in
    /// its special workspace before it maps.
    pub(super) async fn configure_windowrules(&mut self, uid: &str) -> Result<()> {
        self.scratches.set_state("configured", uid);
        let mon = self.snap.active_monitor.clone();

        let (animation, class, skipped, size, forced) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.animation_type(&mon),
                scratch.conf.get_str("class", &mon),
                scratch.conf.get_str_list("skip_windowrules", &mon),
                scratch.conf.get_str("size", &mon),
                scratch.conf.get_str("force_monitor", &mon),
            )
        };
        if class.is_empty() {
            return Ok(());
        }

        let forced = if forced.is_empty() {
            None
        } else if self.snap.monitors.contains(&forced) {
            Some(forced)
        } else {
            error!("forced monitor {forced} doesn't exist");
            let _ = self
                .backend
                .notify_error(&format!(
                    "Monitor '{forced}' doesn't exist, check {uid}'s scratch configuration"
                ))
                .await;
            None
        };

        let monitor = self.backend.get_monitor_props(forced.as_deref(), false).await?;
        let (width, height) = convert_coords(&size, &monitor)?;
        let matcher = self.classify(&class);
        let set_aspect = !skipped.iter().any(|s| s == "aspect");

        let mut rules = Vec::new();
        if !skipped.iter().any(|s| s == "float") {
            rules.push(format!("windowrule float,{matcher}"));
        }
        if !skipped.iter().any(|s| s == "workspace") {
            rules.push(format!(
                "windowrule workspace {} silent,{matcher}",
                mk_scratch_name(uid)
            ));
        }

        if !animation.is_empty() && set_aspect {
            let mut margin_x = (monitor.width - width) / 2;
            let mut margin_y = (monitor.height - height) / 2;
            if monitor.is_rotated() {
                std::mem::swap(&mut margin_x, &mut margin_y);
            }
            let t_pos = match animation.as_str() {
                "fromtop" => format!("{margin_x} -200%"),
                "frombottom" => format!("{margin_x} 200%"),
                "fromright" => format!("200% {margin_y}"),
                "fromleft" => format!("-200% {margin_y}"),
                _ => String::new(),
            };
            if !t_pos.is_empty() {
                rules.push(format!("windowrule move {t_pos},{matcher}"));
            }
        }
        if set_aspect {
            rules.push(format!("windowrule size {width} {height},{matcher}"));
        }

        for rule in rules {
            self.backend.set_keyword(&rule).await?;
        }
        Ok(())
    }

    pub(super) async fn unset_windowrules(&mut self, uid: &str) -> Result<()> {
        let class = self
            .scratches
            .get(uid)
            .map(|s| s.conf.get_str("class", &self.snap.active_monitor))
            .unwrap_or_default();
        if !class.is_empty() {
            let matcher = self.classify(&class);
            self.backend
                .set_keyword(&format!("windowrule unset,{matcher}"))
                .await?;
        }
        Ok(())
    }

    /// Terminate owned processes: SIGTERM, a grace window, then SIGKILL.
    pub(super) async fn shutdown_processes(&mut self) {
        let uids: Vec<String> = self.procs.keys().cloned().collect();
        for uid in uids {
            let Some(mut child) = self.procs.remove(&uid) else {
                continue;
            };
            if let Some(pid) = child.id() {
                // SAFETY: plain signal delivery to a child we spawned.
                unsafe {
                    libc::kill(pid.try_into().unwrap_or(0), libc::SIGTERM);
                }
                for _ in 0..10 {
                    if !process_is_alive(i64::from(pid)).await {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                if process_is_alive(i64::from(pid)).await {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {uid}: {e}");
                    }
                }
            }
            let _ = child.wait().await;
        }
    }
}

/// Liveness through `/proc/<pid>/status`, treating zombies as dead.
async fn process_is_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    let Ok(status) = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await else {
        return false;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("State") {
            let state = rest
                .trim_start_matches(':')
                .split_whitespace()
                .next()
                .unwrap_or("");
            return !matches!(state, "Z" | "X");
        }
    }
    false
}
