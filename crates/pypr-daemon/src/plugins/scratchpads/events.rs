//! Compositor event handlers for the scratchpads plugin.

use std::time::Instant;

use pypr_core::Result;
use pypr_types::normalize_address;
use tracing::{debug, info, warn};

use super::{AFTER_SHOW_INHIBITION, HideFlavors, ScratchpadsPlugin};

impl ScratchpadsPlugin {
    /// Focus-change hook: cancel a pending auto-hide when the scratchpad is
    /// refocused, schedule one (with hysteresis) when it loses focus.
    pub(super) async fn event_activewindowv2(&mut self, addr: &str) -> Result<()> {
        let full_address = normalize_address(addr);
        let now = Instant::now();

        enum Action {
            Refocused { is_primary: bool },
            Unfocused { hysteresis: f64 },
        }

        let mon = self.snap.active_monitor.clone();
        let mut actions: Vec<(String, Action)> = Vec::new();
        for (uid, scratch) in self.scratches.iter() {
            if scratch.client_info.is_none() || self.transitioning.contains(uid) {
                continue;
            }
            if scratch.have_address(&full_address) {
                actions.push((
                    uid.clone(),
                    Action::Refocused {
                        is_primary: scratch.full_address() == full_address,
                    },
                ));
            } else if scratch.visible && scratch.conf.get_str("unfocus", &mon) == "hide" {
                let inhibited = scratch
                    .meta
                    .last_shown
                    .is_some_and(|shown| shown + AFTER_SHOW_INHIBITION > now);
                if inhibited {
                    debug!("(SKIPPED) hide {uid} because another client is active");
                    continue;
                }
                actions.push((
                    uid.clone(),
                    Action::Unfocused {
                        hysteresis: scratch.conf.get_float("hysteresis", &mon, 0.4),
                    },
                ));
            }
        }

        for (uid, action) in actions {
            match action {
                Action::Refocused { is_primary } => {
                    if is_primary {
                        self.last_focused = Some(uid.clone());
                    }
                    self.cancel_hysteresis(&uid);
                }
                Action::Unfocused { hysteresis } => {
                    if hysteresis > 0.0 {
                        self.schedule_autohide(&uid, hysteresis);
                    } else {
                        debug!("hide {uid} because another client is active");
                        self.run_hide(&uid, HideFlavors::AUTOHIDE).await?;
                    }
                }
            }
        }

        self.previously_focused_window = full_address;
        Ok(())
    }

    /// New window hook: adopt windows belonging to a respawning scratchpad,
    /// or fold matching windows into a multi-window scratchpad.
    pub(super) async fn event_openwindow(&mut self, params: &str) -> Result<()> {
        let mut parts = params.splitn(4, ',');
        let addr = parts.next().unwrap_or("");

        if let Some(uid) = self.scratches.uid_by_addr(addr).cloned() {
            self.initialize_scratch(&uid).await?;
            return Ok(());
        }

        let respawned = self.scratches.get_by_state("respawned");
        if !respawned.is_empty() {
            if !self.alternative_lookup().await? {
                info!("Updating scratch info");
                self.update_scratch_info(None).await?;
            }
            return Ok(());
        }

        let clients = self.backend.get_clients(false, None, None).await?;
        for uid in self.scratches.uids() {
            if self.handle_multiwindow(&uid, &clients) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Remove closed windows from auxiliary tracking.
    pub(super) fn event_closewindow(&mut self, addr: &str) -> Result<()> {
        let full = format!("0x{addr}");
        for uid in self.scratches.uids() {
            if let Some(scratch) = self.scratches.get_mut(&uid) {
                scratch.extra_addr.remove(&full);
                scratch.meta.extra_positions.remove(&full);
            }
        }
        Ok(())
    }

    /// Pinned scratchpads follow the active workspace.
    pub(super) fn event_workspace(&mut self, name: &str) -> Result<()> {
        for uid in self.scratches.uids() {
            if let Some(scratch) = self.scratches.get_mut(&uid) {
                scratch.on_workspace_changed(name);
            }
        }
        Ok(())
    }

    /// Auto-hide scratchpads whose monitor disappeared.
    pub(super) async fn event_monitorremoved(&mut self, monitor_name: &str) -> Result<()> {
        let affected: Vec<String> = self
            .scratches
            .iter()
            .filter(|(_, s)| s.monitor == monitor_name)
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in affected {
            if let Err(e) = self.run_hide(&uid, HideFlavors::AUTOHIDE).await {
                warn!("Failed to hide {uid}: {e}");
                let _ = self
                    .backend
                    .notify_info(&format!("Failed to hide {uid}: {e}"))
                    .await;
            }
        }
        Ok(())
    }

    /// Re-apply windowrules after the compositor reloaded its config.
    pub(super) async fn event_configreloaded(&mut self) -> Result<()> {
        for uid in self.scratches.get_by_state("configured") {
            self.configure_windowrules(&uid).await?;
        }
        Ok(())
    }

    pub(super) fn event_changefloatingmode(&mut self, args: &str) -> Result<()> {
        let Some((addr, onoff)) = args.split_once(',') else {
            return Ok(());
        };
        let floating = onoff.trim() == "1";
        for uid in self.scratches.uids() {
            if let Some(scratch) = self.scratches.get_mut(&uid) {
                if scratch.short_address() == addr {
                    if let Some(client) = scratch.client_info.as_mut() {
                        client.floating = floating;
                    }
                }
            }
        }
        Ok(())
    }

    /// Match respawning non-pid scratchpads against the client list.
    /// Returns false when no scratchpad needed the alternative path.
    pub(super) async fn alternative_lookup(&mut self) -> Result<bool> {
        let pending: Vec<String> = self
            .scratches
            .get_by_state("respawned")
            .into_iter()
            .filter(|uid| {
                self.scratches
                    .get(uid)
                    .is_some_and(|s| s.match_props("").0 != "pid")
            })
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }
        debug!("Lookup hack triggered");

        let clients = self.backend.get_clients(false, None, None).await?;
        for uid in pending {
            let found = self
                .scratches
                .get(&uid)
                .and_then(|s| s.find_client(&clients))
                .cloned();
            if let Some(client) = found {
                debug!("client class found: {}", client.address);
                if let Some(scratch) = self.scratches.get_mut(&uid) {
                    scratch.client_info = Some(client);
                }
                self.scratches.reindex(&uid);
            }
        }
        Ok(true)
    }

    /// Refresh client info, matching clients by pid against the scratch
    /// registry (used when a window appears that we cannot attribute yet).
    pub(super) async fn update_scratch_info(&mut self, orig: Option<&str>) -> Result<()> {
        let pid_filter = orig
            .and_then(|uid| self.scratches.get(uid))
            .map(|s| s.pid);

        let clients = self.backend.get_clients(false, None, None).await?;
        for client in clients {
            if pid_filter.is_some_and(|pid| pid != client.pid) {
                continue;
            }
            let short = client.address.strip_prefix("0x").unwrap_or(&client.address);
            let uid = self
                .scratches
                .uid_by_addr(short)
                .or_else(|| {
                    if client.pid > 0 {
                        self.scratches.uid_by_pid(client.pid)
                    } else {
                        None
                    }
                })
                .cloned();
            if let Some(uid) = uid {
                if let Some(scratch) = self.scratches.get_mut(&uid) {
                    scratch.client_info = Some(client);
                }
                self.scratches.reindex(&uid);
                return Ok(());
            }
        }
        info!("Didn't update scratch info");
        Ok(())
    }

    /// Fold clients matching the scratchpad's rule into its auxiliary set.
    /// Returns true when at least one new window was adopted.
    pub(super) fn handle_multiwindow(
        &mut self,
        uid: &str,
        clients: &[pypr_types::ClientInfo],
    ) -> bool {
        let mon = self.snap.active_monitor.clone();
        let Some(scratch) = self.scratches.get(uid) else {
            return false;
        };
        if !scratch.conf.get_bool("multi", &mon, true) {
            return false;
        }
        let primary = scratch.full_address();
        let matching: Vec<String> = clients
            .iter()
            .filter(|c| c.address != primary && scratch.matches_client(c))
            .map(|c| c.address.clone())
            .collect();

        let mut added = false;
        if let Some(scratch) = self.scratches.get_mut(uid) {
            for address in matching {
                added |= scratch.extra_addr.insert(address);
            }
        }
        added
    }
}
