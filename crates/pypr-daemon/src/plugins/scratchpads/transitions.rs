//! Show and hide transitions, with animations and focus restoration.

use std::time::Instant;

use futures_util::future::BoxFuture;
use pypr_core::units::{convert_coords, convert_monitor_dimension};
use pypr_core::{Error, Result};
use pypr_types::{ClientInfo, MonitorInfo};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::anim::{placement, slide_action};
use super::helpers::{apply_offset, compute_offset, get_size, mk_scratch_name};
use super::{FocusTracker, HideFlavors, ScratchpadsPlugin};

impl ScratchpadsPlugin {
    /// Boxed variant breaking the hide -> restore-excluded -> show
    /// future-type cycle.
    fn run_show_boxed(&mut self, uid: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.run_show(&uid).await })
    }

    pub(super) async fn run_show(&mut self, uid: &str) -> Result<()> {
        if uid == "*" {
            let hidden: Vec<String> = self
                .scratches
                .iter()
                .filter(|(_, s)| !s.visible)
                .map(|(u, _)| u.clone())
                .collect();
            for one in hidden {
                self.show_one(&one).await?;
            }
            return Ok(());
        }
        self.show_one(uid).await
    }

    async fn show_one(&mut self, uid: &str) -> Result<()> {
        if !self.scratches.contains(uid) {
            warn!("{uid} doesn't exist, can't show.");
            let _ = self
                .backend
                .notify_error(&format!(
                    "Scratchpad '{uid}' not found, check your configuration or the show parameter"
                ))
                .await;
            return Ok(());
        }
        if !self.transitioning.insert(uid.to_string()) {
            debug!("{uid} is already transitioning");
            return Ok(());
        }
        self.cancel_hysteresis(uid);
        info!("Showing {uid}");

        let result = self.show_inner(uid).await;
        self.transitioning.remove(uid);
        result
    }

    async fn show_inner(&mut self, uid: &str) -> Result<()> {
        let was_alive = self.is_alive(uid).await;
        if !self.ensure_alive(uid).await? {
            error!("Failed to show {uid}, aborting.");
            return Ok(());
        }

        self.hide_excluded(uid).await?;
        self.initialize_scratch(uid).await?;

        let mon = self.snap.active_monitor.clone();
        let forced = {
            let Some(scratch) = self.scratches.get_mut(uid) else {
                return Ok(());
            };
            scratch.visible = true;
            scratch.meta.space_identifier = (
                self.snap.active_workspace.clone(),
                self.snap.active_monitor.clone(),
            );
            scratch.forced_monitor(&self.snap.monitors, &mon)
        };

        let monitor = self
            .backend
            .get_monitor_props(forced.as_deref(), false)
            .await?;

        let address = self
            .scratches
            .get(uid)
            .map(|s| s.full_address())
            .unwrap_or_default();
        if address.is_empty() {
            return Err(Error::Backend(format!("{uid} has no window address")));
        }

        self.show_transition(uid, &monitor, was_alive).await?;

        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.monitor = monitor.name.clone();
        }
        Ok(())
    }

    /// Hide scratchpads excluded by this one, remembering them for
    /// restoration when `restore_excluded` is set.
    async fn hide_excluded(&mut self, uid: &str) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let (excludes, restore_excluded) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            let excludes = match scratch.conf.get("excludes", &mon) {
                Some(Value::String(s)) if s == "*" => self
                    .scratches
                    .iter()
                    .filter(|(u, _)| u.as_str() != uid)
                    .map(|(u, _)| u.clone())
                    .collect(),
                Some(Value::String(s)) if !s.is_empty() => vec![s],
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            (
                excludes,
                scratch.conf.get_bool("restore_excluded", &mon, false),
            )
        };

        for e_uid in excludes {
            let visible = self.scratches.get(&e_uid).is_some_and(|s| s.visible);
            if visible {
                self.run_hide(&e_uid, HideFlavors::AUTOHIDE_IGNORE_TILED)
                    .await?;
                if restore_excluded {
                    if let Some(scratch) = self.scratches.get_mut(uid) {
                        scratch.excluded_scratches.push(e_uid);
                    }
                }
            }
        }
        Ok(())
    }

    async fn show_transition(
        &mut self,
        uid: &str,
        monitor: &MonitorInfo,
        was_alive: bool,
    ) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let (allow_special, preserve_aspect, last_monitor, address) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.conf.get_bool("allow_special_workspaces", &mon, true),
                scratch.conf.get_bool("preserve_aspect", &mon, false),
                scratch.monitor.clone(),
                scratch.full_address(),
            )
        };

        // Spill onto a pre-existing special workspace when allowed.
        let special = &monitor.special_workspace.name;
        let wrkspc = if !allow_special
            || special.is_empty()
            || special.starts_with("special:scratch")
        {
            monitor.active_workspace.name.clone()
        } else {
            special.clone()
        };

        if !self.previously_focused_window.is_empty() {
            self.focused_window_tracking.insert(
                uid.to_string(),
                FocusTracker {
                    prev_focused_window: self.previously_focused_window.clone(),
                    prev_focused_window_wrkspc: wrkspc.clone(),
                },
            );
        }

        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.meta.last_shown = Some(Instant::now());
        }

        // Aspect is re-applied unless it is preserved from a previous show
        // on the same monitor.
        let should_set_aspect = !(preserve_aspect && was_alive) || last_monitor != mon;
        if should_set_aspect {
            self.fix_size(uid, monitor).await?;
        }

        let clients = self.backend.get_clients(false, None, None).await?;
        self.handle_multiwindow(uid, &clients);

        let extras: Vec<String> = self
            .scratches
            .get(uid)
            .map(|s| s.extra_addr.iter().cloned().collect())
            .unwrap_or_default();

        let mut move_commands = Vec::new();
        if was_alive {
            // Newly spawned windows land on the right monitor via rules.
            move_commands.push(format!(
                "moveworkspacetomonitor {} {}",
                mk_scratch_name(uid),
                monitor.name
            ));
        }
        move_commands.push(format!("movetoworkspacesilent {wrkspc},address:{address}"));
        move_commands.push(format!("alterzorder top,address:{address}"));
        for addr in &extras {
            move_commands.push(format!("movetoworkspacesilent {wrkspc},address:{addr}"));
            move_commands.push(format!("alterzorder top,address:{addr}"));
        }
        self.backend.execute_many(&move_commands, true).await?;

        self.update_infos(uid, &clients).await;

        let mut position_fixed = false;
        if should_set_aspect {
            position_fixed = self.fix_position(uid, monitor).await?;
        }
        if !position_fixed {
            let relative_animation = preserve_aspect && was_alive && !should_set_aspect;
            self.animate_show(uid, monitor, relative_animation).await?;
        }
        self.backend.focus_window(&address).await?;

        let pinned_already = self
            .scratches
            .get(uid)
            .and_then(|s| s.client_info.as_ref())
            .is_some_and(|c| c.pinned);
        if !pinned_already {
            self.pin_scratch(uid).await?;
        }

        if let Some(scratch) = self.scratches.get_mut(uid) {
            scratch.meta.last_shown = Some(Instant::now());
            scratch.meta.monitor_info = Some(monitor.clone());
        }
        Ok(())
    }

    async fn pin_scratch(&mut self, uid: &str) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let (pinned, address, extras) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.conf.get_bool("pinned", &mon, true),
                scratch.full_address(),
                scratch.extra_addr.iter().cloned().collect::<Vec<_>>(),
            )
        };
        if !pinned {
            return Ok(());
        }
        self.backend.pin_window(&address).await?;
        for addr in extras {
            self.backend.pin_window(&addr).await?;
        }
        Ok(())
    }

    /// Refresh the primary client record, falling back to auxiliary
    /// windows when the primary vanished.
    async fn update_infos(&mut self, uid: &str, clients: &[ClientInfo]) {
        if self
            .update_client_info(uid, None, Some(clients))
            .await
            .is_ok()
        {
            return;
        }
        let extras: Vec<String> = self
            .scratches
            .get(uid)
            .map(|s| s.extra_addr.iter().cloned().collect())
            .unwrap_or_default();
        for alt_addr in extras {
            if let Some(client) = clients.iter().find(|c| c.address == alt_addr).cloned() {
                if self
                    .update_client_info(uid, Some(client), Some(clients))
                    .await
                    .is_ok()
                {
                    return;
                }
            }
        }
        error!("Lost the client info for {uid}");
    }

    async fn animate_show(
        &mut self,
        uid: &str,
        monitor: &MonitorInfo,
        relative_animation: bool,
    ) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let animation_type = self
            .scratches
            .get(uid)
            .map(|s| s.animation_type(&mon))
            .unwrap_or_default();
        if animation_type.is_empty() {
            return Ok(());
        }

        let size_known = self
            .scratches
            .get(uid)
            .and_then(|s| s.client_info.as_ref())
            .is_some_and(|c| c.size != (0, 0));
        if !size_known {
            self.update_scratch_info(Some(uid)).await?;
        }

        let Some(scratch) = self.scratches.get(uid) else {
            return Ok(());
        };
        let multi = scratch.conf.get_bool("multi", &mon, true);
        let margin = scratch
            .conf
            .get("margin", &mon)
            .unwrap_or_else(|| json!(60));
        let address = scratch.full_address();
        let Some(client) = scratch.client_info.as_ref() else {
            return Ok(());
        };

        let main_position = if relative_animation {
            let offset = scratch
                .meta
                .extra_positions
                .get(&address)
                .copied()
                .unwrap_or((0, 0));
            apply_offset((monitor.x, monitor.y), offset)
        } else {
            match placement(&animation_type, monitor, client, &margin)? {
                Some(pos) => pos,
                None => return Ok(()),
            }
        };

        let mut animation_commands =
            vec![format!("movewindowpixel exact {} {},address:{address}", main_position.0, main_position.1)];
        if multi {
            for addr in &scratch.extra_addr {
                if let Some(offset) = scratch.meta.extra_positions.get(addr) {
                    let pos = apply_offset(main_position, *offset);
                    animation_commands.push(format!(
                        "movewindowpixel exact {} {},address:{addr}",
                        pos.0, pos.1
                    ));
                }
            }
        }
        self.backend.execute_many(&animation_commands, false).await?;
        Ok(())
    }

    async fn fix_size(&mut self, uid: &str, monitor: &MonitorInfo) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let (size, max_size, address) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.conf.get_str("size", &mon),
                scratch.conf.get_str("max_size", &mon),
                scratch.full_address(),
            )
        };
        if size.is_empty() {
            return Ok(());
        }
        let (mut width, mut height) = convert_coords(&size, monitor)?;
        if !max_size.is_empty() {
            let (max_width, max_height) = convert_coords(&max_size, monitor)?;
            width = width.min(max_width);
            height = height.min(max_height);
        }
        self.backend.resize_window(&address, width, height).await?;
        Ok(())
    }

    async fn fix_position(&mut self, uid: &str, monitor: &MonitorInfo) -> Result<bool> {
        let mon = self.snap.active_monitor.clone();
        let (position, address) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(false);
            };
            (
                scratch.conf.get_str("position", &mon),
                scratch.full_address(),
            )
        };
        if position.is_empty() {
            return Ok(false);
        }
        let (x, y) = convert_coords(&position, monitor)?;
        self.backend
            .move_window(&address, x + monitor.x, y + monitor.y)
            .await?;
        Ok(true)
    }

    /// Hide slide distance: explicit `offset` or the full monitor size.
    async fn get_offsets(&self, uid: &str, monitor: &MonitorInfo) -> Result<(i32, i32)> {
        let mon = &self.snap.active_monitor;
        let Some(scratch) = self.scratches.get(uid) else {
            return Ok((0, 0));
        };
        let offset = scratch.conf.get("offset", mon);
        let client_size = scratch
            .client_info
            .as_ref()
            .map_or((0, 0), |c| c.size);
        let aspect = if monitor.is_rotated() {
            (client_size.1, client_size.0)
        } else {
            client_size
        };

        if let Some(offset) = offset.filter(|v| !v.is_null() && v.as_str() != Some("")) {
            return Ok((
                convert_monitor_dimension(&offset, aspect.0, monitor)?,
                convert_monitor_dimension(&offset, aspect.1, monitor)?,
            ));
        }

        let (mon_w, mon_h) = get_size(monitor);
        Ok((
            convert_monitor_dimension(&json!("100%"), mon_w, monitor)?,
            convert_monitor_dimension(&json!("100%"), mon_h, monitor)?,
        ))
    }

    pub(super) async fn run_hide(&mut self, uid: &str, flavor: HideFlavors) -> Result<()> {
        if uid == "*" {
            let visible: Vec<String> = self
                .scratches
                .iter()
                .filter(|(_, s)| s.visible)
                .map(|(u, _)| u.clone())
                .collect();
            for one in visible {
                self.hide_one(&one, flavor).await?;
            }
            return Ok(());
        }
        self.hide_one(uid, flavor).await
    }

    async fn hide_one(&mut self, uid: &str, flavor: HideFlavors) -> Result<()> {
        if !self.scratches.contains(uid) {
            warn!("{uid} is not configured");
            let _ = self
                .backend
                .notify_error(&format!(
                    "Scratchpad '{uid}' not found, check your configuration or the hide parameter"
                ))
                .await;
            return Ok(());
        }
        if !self.transitioning.insert(uid.to_string()) {
            debug!("{uid} is already transitioning");
            return Ok(());
        }
        let result = self.hide_inner(uid, flavor).await;
        self.transitioning.remove(uid);
        result
    }

    async fn hide_inner(&mut self, uid: &str, flavor: HideFlavors) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            if flavor.ignore_tiled
                && !scratch.client_info.as_ref().is_some_and(|c| c.floating)
            {
                return Ok(());
            }
            if !scratch.visible && !flavor.forced && !flavor.autohide {
                let _ = self
                    .backend
                    .notify_error(&format!("Scratchpad '{uid}' is not visible, will not hide."))
                    .await;
                warn!("{uid} is already hidden");
                return Ok(());
            }
        }

        let active_window = self.snap.active_window.clone();
        let active_workspace = self.snap.active_workspace.clone();

        let clients = self.backend.get_clients(false, None, None).await?;
        self.update_client_info(uid, None, Some(&clients)).await?;

        let monitor_info = match self
            .scratches
            .get(uid)
            .and_then(|s| s.meta.monitor_info.clone())
        {
            Some(info) => info,
            None => self.backend.get_monitor_props(None, false).await?,
        };

        let multi = self
            .scratches
            .get(uid)
            .is_some_and(|s| s.conf.get_bool("multi", &mon, true));
        if multi {
            self.handle_multiwindow(uid, &clients);
        }

        // Remember the layout: primary relative to its monitor, extras
        // relative to the primary. This feeds preserve_aspect re-shows.
        if let Some(scratch) = self.scratches.get_mut(uid) {
            let Some(client) = scratch.client_info.as_ref() else {
                return Ok(());
            };
            let ref_position = client.at;
            let address = scratch.full_address();
            scratch.meta.extra_positions.insert(
                address,
                compute_offset(ref_position, (monitor_info.x, monitor_info.y)),
            );
            if multi {
                for sub_client in &clients {
                    if scratch.extra_addr.contains(&sub_client.address) {
                        scratch.meta.extra_positions.insert(
                            sub_client.address.clone(),
                            compute_offset(sub_client.at, ref_position),
                        );
                    }
                }
            }
            scratch.visible = false;
            scratch.meta.should_hide = false;
        }

        info!("Hiding {uid}");
        self.pin_scratch(uid).await?;
        self.hide_transition(uid, &monitor_info).await?;

        let (address, extras, close_on_hide) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.full_address(),
                scratch.extra_addr.iter().cloned().collect::<Vec<_>>(),
                scratch.conf.get_bool("close_on_hide", &mon, false),
            )
        };

        if close_on_hide {
            self.backend.close_window(&address).await?;
            for addr in &extras {
                self.backend.close_window(addr).await?;
            }
            if let Some(scratch) = self.scratches.get_mut(uid) {
                let pid = scratch.pid;
                scratch.reset(pid);
                scratch.extra_addr.clear();
            }
        } else {
            self.backend
                .move_window_to_workspace(&address, &mk_scratch_name(uid), true)
                .await?;
            for addr in &extras {
                self.backend
                    .move_window_to_workspace(addr, &mk_scratch_name(uid), true)
                    .await?;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        }

        let excluded: Vec<String> = self
            .scratches
            .get_mut(uid)
            .map(|s| std::mem::take(&mut s.excluded_scratches))
            .unwrap_or_default();
        for e_uid in excluded {
            self.run_show_boxed(e_uid).await?;
        }

        self.handle_focus_tracking(uid, &active_window, &active_workspace, &clients)
            .await;
        Ok(())
    }

    /// Slide out along the animation edge, then wait out `hide_delay`.
    async fn hide_transition(&mut self, uid: &str, monitor: &MonitorInfo) -> Result<()> {
        let mon = self.snap.active_monitor.clone();
        let (animation_type, hide_delay, address, extras) = {
            let Some(scratch) = self.scratches.get(uid) else {
                return Ok(());
            };
            (
                scratch.animation_type(&mon),
                scratch.conf.get_float("hide_delay", &mon, 0.0),
                scratch.full_address(),
                scratch.extra_addr.iter().cloned().collect::<Vec<_>>(),
            )
        };
        if animation_type.is_empty() {
            return Ok(());
        }

        let offset = self.get_offsets(uid, monitor).await?;
        if let Some(action) = slide_action(&animation_type, offset) {
            let commands: Vec<String> = extras
                .iter()
                .chain(std::iter::once(&address))
                .map(|addr| format!("{action},address:{addr}"))
                .collect();
            self.backend.execute_many(&commands, false).await?;
        }
        if hide_delay > 0.0 {
            tokio::time::sleep(std::time::Duration::from_secs_f64(hide_delay)).await;
        }
        Ok(())
    }

    /// Smart focus: give focus back to the window the user was on before
    /// the show, when it still exists on the same workspace.
    async fn handle_focus_tracking(
        &mut self,
        uid: &str,
        active_window: &str,
        active_workspace: &str,
        clients: &[ClientInfo],
    ) {
        let mon = self.snap.active_monitor.clone();
        let smart_focus = self
            .scratches
            .get(uid)
            .is_some_and(|s| s.conf.get_bool("smart_focus", &mon, true));
        if !smart_focus {
            return;
        }

        // Trackers pointing at this scratchpad's own windows are stale.
        let own_addresses: Vec<String> = self
            .scratches
            .get(uid)
            .map(|s| {
                let mut addrs: Vec<String> = s.extra_addr.iter().cloned().collect();
                addrs.push(s.full_address());
                addrs
            })
            .unwrap_or_default();
        for tracker in self.focused_window_tracking.values_mut() {
            if own_addresses.contains(&tracker.prev_focused_window) {
                tracker.prev_focused_window.clear();
                tracker.prev_focused_window_wrkspc.clear();
            }
        }

        let Some(tracker) = self.focused_window_tracking.get(uid).cloned() else {
            return;
        };
        if tracker.prev_focused_window.is_empty()
            || tracker.prev_focused_window_wrkspc.starts_with("special:")
        {
            return;
        }

        let same_workspace = tracker.prev_focused_window_wrkspc == active_workspace;
        let client = clients
            .iter()
            .find(|c| c.address == tracker.prev_focused_window);
        let scratch_has = |addr: &str| {
            self.scratches
                .get(uid)
                .is_some_and(|s| s.have_address(addr))
        };

        if let Some(client) = client {
            if scratch_has(active_window)
                && same_workspace
                && !scratch_has(&tracker.prev_focused_window)
                && !client.workspace.name.starts_with("special")
            {
                let _ = self
                    .backend
                    .focus_window(&tracker.prev_focused_window)
                    .await;
            }
        }
    }
}
