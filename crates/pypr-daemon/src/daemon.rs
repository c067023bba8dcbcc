//! The daemon core: plugin host and dispatcher.
//!
//! Each plugin owns one FIFO queue and one serial runner task, so its
//! handlers never interleave. Events are fire-and-forget; commands await a
//! oneshot result bounded by [`TASK_TIMEOUT`]. The built-in `pyprland` core
//! plugin runs in-band while a cooperative gate pauses the other runners,
//! so plugins never observe half-reloaded state.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pypr_core::backend::proxy::BackendProxy;
use pypr_core::backend::{Backend, set_notify_method};
use pypr_core::config::{ConfigView, load_config, merge};
use pypr_core::state::{SharedState, SharedStateRef};
use pypr_core::{Error, Result};
use pypr_types::{Environment, RESPONSE_ERROR, RESPONSE_OK};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandRegistry, normalize_command_name};
use crate::plugins::{self, Job, Plugin, PluginCtx, QueueItem, ReloadReason};

/// Upper bound for any queued handler invocation.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(35);

/// Handlers skipped when `(handler, args)` equals the previous invocation.
/// Tames the compositor's habit of re-emitting focus events.
const DEDUPLICATED_HANDLERS: &[&str] = &["event_activewindow", "event_activewindowv2"];

fn strict_mode() -> bool {
    std::env::var("PYPRLAND_STRICT_ERRORS").is_ok_and(|v| !v.is_empty())
}

type PluginInstance = Arc<Mutex<Box<dyn Plugin>>>;

pub(crate) struct PluginSlot {
    pub instance: PluginInstance,
    pub queue: mpsc::UnboundedSender<QueueItem>,
    pub events: HashSet<String>,
    pub command_names: HashSet<String>,
    pub in_band: bool,
    runner: JoinHandle<()>,
}

#[derive(Default)]
struct PluginTable {
    order: Vec<String>,
    slots: HashMap<String, PluginSlot>,
}

impl PluginTable {
    /// Plugin names declaring a handler, in load order.
    fn handlers_for(&self, full_name: &str) -> Vec<String> {
        let command = full_name.strip_prefix("run_");
        self.order
            .iter()
            .filter(|name| {
                let Some(slot) = self.slots.get(*name) else {
                    return false;
                };
                match command {
                    Some(cmd) => slot.command_names.contains(cmd),
                    None => slot.events.contains(full_name),
                }
            })
            .cloned()
            .collect()
    }
}

pub struct Daemon {
    pub state: SharedStateRef,
    pub backend: Arc<dyn Backend>,
    /// The daemon's own proxy, for notifications and event parsing.
    pub proxy: BackendProxy,
    pub config: RwLock<Value>,
    config_path: Option<PathBuf>,
    plugins: RwLock<PluginTable>,
    registry: RwLock<CommandRegistry>,
    dedup_last: Mutex<HashMap<String, String>>,
    /// Core-plugin gate: runners pause while this is `false`.
    gate: watch::Sender<bool>,
    in_band_lock: Mutex<()>,
    stopped: watch::Sender<bool>,
}

impl Daemon {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config_path: Option<PathBuf>) -> Arc<Self> {
        let environment = backend.environment();
        let proxy = BackendProxy::new(backend.clone(), "pypr");
        let (gate, _) = watch::channel(true);
        let (stopped, _) = watch::channel(false);
        Arc::new(Self {
            state: Arc::new(RwLock::new(SharedState::new(environment))),
            backend,
            proxy,
            config: RwLock::new(Value::Object(serde_json::Map::new())),
            config_path,
            plugins: RwLock::new(PluginTable::default()),
            registry: RwLock::new(CommandRegistry::new()),
            dedup_last: Mutex::new(HashMap::new()),
            gate,
            in_band_lock: Mutex::new(()),
            stopped,
        })
    }

    #[must_use]
    pub fn stopped_rx(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    pub fn request_stop(&self) {
        let _ = self.stopped.send(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// First configuration load; fatal on error.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if let Err(e) = self.load_config_full(ReloadReason::Init).await {
            let text = format!("Failed to load config: {e}");
            error!("{text}");
            let _ = self.proxy.notify_error(&text).await;
            return Err(e);
        }
        Ok(())
    }

    /// (Re)load the configuration and reconcile the plugin set.
    pub async fn load_config_full(self: &Arc<Self>, reason: ReloadReason) -> Result<()> {
        let fresh = load_config(self.config_path.as_deref())?;

        let pyprland = fresh
            .get("pyprland")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::ConfigInvalid("missing [pyprland] section".into()))?;
        let plugin_list: Vec<String> = pyprland
            .get("plugins")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::ConfigInvalid("missing pyprland.plugins list".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let notification_type = pyprland
            .get("notification_type")
            .and_then(Value::as_str)
            .unwrap_or("auto");
        if notification_type != "auto" {
            set_notify_method(notification_type);
        }
        if let Some(paths) = pyprland.get("plugins_paths").and_then(Value::as_array) {
            if !paths.is_empty() {
                warn!("plugins_paths is not supported by the compiled daemon; ignoring");
            }
        }

        {
            let mut config = self.config.write().await;
            merge(&mut config, fresh, true);
        }

        self.reconfigure_plugins(&plugin_list, reason).await
    }

    fn desktop_override(pyprland: &serde_json::Map<String, Value>) -> Option<Environment> {
        pyprland
            .get("desktop")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }

    async fn reconfigure_plugins(
        self: &Arc<Self>,
        plugin_list: &[String],
        reason: ReloadReason,
    ) -> Result<()> {
        let mut wanted = vec!["pyprland".to_string()];
        for name in plugin_list {
            if !wanted.contains(name) {
                wanted.push(name.clone());
            }
        }

        let desktop = {
            let config = self.config.read().await;
            let environment = self.backend.environment();
            config
                .get("pyprland")
                .and_then(Value::as_object)
                .and_then(Self::desktop_override)
                .unwrap_or(environment)
        };

        self.unload_removed(&wanted).await;

        for name in &wanted {
            let already_loaded = self.plugins.read().await.slots.contains_key(name);
            if !already_loaded && !self.load_single_plugin(name, desktop).await? {
                continue;
            }
            self.init_plugin(name, reason).await?;
        }

        Ok(())
    }

    async fn unload_removed(&self, wanted: &[String]) {
        let removed: Vec<String> = {
            let table = self.plugins.read().await;
            table
                .order
                .iter()
                .filter(|name| !wanted.contains(*name))
                .cloned()
                .collect()
        };

        for name in removed {
            info!("Unloading plugin {name}");
            let slot = {
                let mut table = self.plugins.write().await;
                table.order.retain(|n| n != &name);
                table.slots.remove(&name)
            };
            if let Some(slot) = slot {
                if let Err(e) = slot.instance.lock().await.exit().await {
                    warn!("Error while unloading {name}: {e}");
                }
                let _ = slot.queue.send(None);
            }
            self.registry.write().await.unregister_source(&name);
        }
    }

    /// Load and start one plugin. Returns false when the plugin is skipped
    /// (unsupported environment).
    async fn load_single_plugin(self: &Arc<Self>, name: &str, desktop: Environment) -> Result<bool> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<QueueItem>();
        let ctx = PluginCtx {
            name: name.to_string(),
            state: self.state.clone(),
            backend: BackendProxy::new(self.backend.clone(), name),
            self_queue: queue_tx.clone(),
        };

        let Some(mut plugin) = plugins::instantiate(name, ctx) else {
            let text = format!("Config requires plugin \"{name}\" but pypr can't find it");
            error!("{text}");
            let _ = self.proxy.notify_info(&text).await;
            return Err(Error::PluginLoad(name.to_string()));
        };

        let environments = plugin.environments();
        if !environments.is_empty() && !environments.contains(&desktop) {
            info!("Skipping plugin {name}: desktop {desktop} not supported {environments:?}");
            return Ok(false);
        }

        if let Err(e) = plugin.init().await {
            let text = format!("Error loading plugin {name}: {e}");
            error!("{text}");
            let _ = self.proxy.notify_info(&text).await;
            return Err(Error::PluginLoad(name.to_string()));
        }

        let events: HashSet<String> = plugin
            .event_handlers()
            .iter()
            .map(ToString::to_string)
            .collect();
        let command_names: HashSet<String> =
            plugin.commands().iter().map(|c| c.name.to_string()).collect();
        self.registry
            .write()
            .await
            .register_plugin(name, plugin.commands());

        let in_band = name == "pyprland";
        let instance: PluginInstance = Arc::new(Mutex::new(plugin));
        let runner = self.spawn_runner(name.to_string(), instance.clone(), queue_rx);

        let mut table = self.plugins.write().await;
        table.order.push(name.to_string());
        table.slots.insert(
            name.to_string(),
            PluginSlot {
                instance,
                queue: queue_tx,
                events,
                command_names,
                in_band,
                runner,
            },
        );
        Ok(true)
    }

    /// Push the plugin's config subtree and run `on_reload` with a timeout.
    async fn init_plugin(self: &Arc<Self>, name: &str, reason: ReloadReason) -> Result<()> {
        let section = {
            let config = self.config.read().await;
            config.get(name).cloned().unwrap_or(Value::Object(serde_json::Map::new()))
        };
        let instance = {
            let table = self.plugins.read().await;
            let Some(slot) = table.slots.get(name) else {
                return Ok(());
            };
            slot.instance.clone()
        };

        let mut plugin = instance.lock().await;
        let view = ConfigView::new(name, section.clone(), plugin.schema());
        plugin.load_config(view);

        if let Some(section_map) = section.as_object() {
            let validation_errors = plugin.validate_config(section_map);
            for validation_error in &validation_errors {
                error!("{validation_error}");
            }
            if !validation_errors.is_empty() {
                let _ = self
                    .proxy
                    .notify_error(&format!(
                        "Plugin '{name}' has {} config error(s). Check logs for details.",
                        validation_errors.len()
                    ))
                    .await;
            }
        }

        match timeout(TASK_TIMEOUT / 2, plugin.on_reload(reason)).await {
            Ok(Ok(())) => {
                info!("[{name}] configured");
                Ok(())
            }
            Ok(Err(e)) => {
                let text = format!("Error initializing plugin {name}: {e}");
                error!("{text}");
                let _ = self.proxy.notify_info(&text).await;
                Err(Error::PluginLoad(name.to_string()))
            }
            Err(_) => {
                info!("[{name}] timed out on reload");
                Ok(())
            }
        }
    }

    fn spawn_runner(
        self: &Arc<Self>,
        name: String,
        instance: PluginInstance,
        mut queue_rx: mpsc::UnboundedReceiver<QueueItem>,
    ) -> JoinHandle<()> {
        let proxy = self.proxy.clone();
        let mut gate = self.gate.subscribe();
        let stop = self.stopped.clone();

        tokio::spawn(async move {
            while let Some(item) = queue_rx.recv().await {
                let Some(job) = item else {
                    break;
                };
                // Pause while the core plugin is executing.
                while !*gate.borrow() {
                    if gate.changed().await.is_err() {
                        return;
                    }
                }
                let Job {
                    handler,
                    args,
                    respond,
                } = job;
                let outcome =
                    match timeout(TASK_TIMEOUT, run_job(&name, &instance, &proxy, &stop, &handler, &args))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            error!("Timeout running plugin {name}::{handler}");
                            (false, format!("{name}::{handler}: Command timed out"))
                        }
                    };
                if let Some(tx) = respond {
                    let _ = tx.send(outcome);
                }
            }
            debug!("[{name}] runner stopped");
        })
    }

    async fn run_in_band(&self, name: &str, full_name: &str, args: &str) -> (bool, String) {
        let instance = {
            let table = self.plugins.read().await;
            let Some(slot) = table.slots.get(name) else {
                return (false, format!("{name}: not loaded"));
            };
            slot.instance.clone()
        };
        let _serial = self.in_band_lock.lock().await;
        let _ = self.gate.send(false);
        let result = run_job(name, &instance, &self.proxy, &self.stopped, full_name, args).await;
        let _ = self.gate.send(true);
        result
    }

    /// Dispatch `full_name(args)` to every plugin declaring the handler.
    ///
    /// Returns `(handled, success, message)`: `handled` when at least one
    /// handler was found; `message` carries the first return body or the
    /// first error.
    pub async fn call_handler(
        self: &Arc<Self>,
        full_name: &str,
        args: &str,
        notify: Option<&str>,
        wait: bool,
    ) -> (bool, bool, String) {
        if DEDUPLICATED_HANDLERS.contains(&full_name) {
            let mut last = self.dedup_last.lock().await;
            if last.get(full_name).map(String::as_str) == Some(args) {
                return (true, true, String::new());
            }
            last.insert(full_name.to_string(), args.to_string());
        }

        let targets = {
            let table = self.plugins.read().await;
            table.handlers_for(full_name)
        };

        let mut handled = false;
        let mut result_msg = String::new();
        let mut error_msg = String::new();

        for name in targets {
            handled = true;
            let (in_band, queue) = {
                let table = self.plugins.read().await;
                let Some(slot) = table.slots.get(&name) else {
                    continue;
                };
                (slot.in_band, slot.queue.clone())
            };

            let (success, msg) = if in_band {
                self.run_in_band(&name, full_name, args).await
            } else if wait {
                let (tx, rx) = oneshot::channel();
                let job = Job {
                    handler: full_name.to_string(),
                    args: args.to_string(),
                    respond: Some(tx),
                };
                if queue.send(Some(job)).is_err() {
                    continue;
                }
                match timeout(TASK_TIMEOUT, rx).await {
                    Ok(Ok(result)) => result,
                    _ => {
                        let text = format!("{name}::{full_name}: Command timed out");
                        error!("{text}");
                        (false, text)
                    }
                }
            } else {
                let job = Job {
                    handler: full_name.to_string(),
                    args: args.to_string(),
                    respond: None,
                };
                let _ = queue.send(Some(job));
                (true, String::new())
            };

            if success {
                if !msg.is_empty() && result_msg.is_empty() {
                    result_msg = msg;
                }
            } else if error_msg.is_empty() {
                error_msg = msg;
            }
        }

        if !handled {
            if let Some(cmd) = notify {
                error_msg =
                    format!("Unknown command \"{cmd}\". Try \"help\" for available commands.");
                let _ = self.proxy.notify_info(&error_msg).await;
            }
        }

        if error_msg.is_empty() {
            (handled, true, result_msg)
        } else {
            (handled, false, error_msg)
        }
    }

    /// Parse and dispatch one raw event line from the compositor.
    pub async fn handle_event_line(self: &Arc<Self>, line: &str) {
        if let Some((handler, payload)) = self.proxy.parse_event(line) {
            let _ = self.call_handler(&handler, &payload, None, false).await;
        }
    }

    /// Handle one control-socket command and build the wire response.
    pub async fn process_command(self: &Arc<Self>, data: &str) -> String {
        let data = data.trim();
        if data.is_empty() {
            warn!("Empty command received");
            return format!("{RESPONSE_ERROR}: No command provided\n");
        }

        if std::env::var("PYPR_DEMO").is_ok_and(|v| !v.is_empty()) {
            pypr_core::backend::notify_send(data, 4000).await;
        }

        let (cmd_raw, args) = match data.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (data, ""),
        };
        let cmd = normalize_command_name(cmd_raw);

        if let Some(response) = self.run_builtin(&cmd, args).await {
            return response;
        }

        let full_name = format!("run_{cmd}");
        let (handled, success, msg) = self.call_handler(&full_name, args, Some(&cmd), true).await;
        if !handled {
            warn!("No such command: {cmd}");
            return format!("{RESPONSE_ERROR}: {msg}\n");
        }
        if !success {
            return format!("{RESPONSE_ERROR}: {msg}\n");
        }
        if msg.is_empty() {
            format!("{RESPONSE_OK}\n")
        } else {
            format!("{RESPONSE_OK}\n{msg}")
        }
    }

    /// Built-in commands run in-band under the core gate, because they
    /// touch daemon-wide structures (config, plugin set).
    async fn run_builtin(self: &Arc<Self>, cmd: &str, args: &str) -> Option<String> {
        let body: Result<String> = match cmd {
            "version" => Ok(format!("{}\n", env!("CARGO_PKG_VERSION"))),
            "help" => {
                let registry = self.registry.read().await;
                if args.is_empty() {
                    Ok(registry.get_help())
                } else {
                    Ok(registry.get_command_help(args))
                }
            }
            "dumpjson" => {
                let config = self.config.read().await;
                Ok(serde_json::to_string_pretty(&*config).unwrap_or_default())
            }
            "reload" => {
                let _serial = self.in_band_lock.lock().await;
                let _ = self.gate.send(false);
                let result = self.load_config_full(ReloadReason::Reload).await;
                let _ = self.gate.send(true);
                drop(_serial);
                result.map(|()| String::new())
            }
            "exit" => {
                self.request_stop();
                Ok(String::new())
            }
            _ => return None,
        };

        Some(match body {
            Ok(text) if text.is_empty() => format!("{RESPONSE_OK}\n"),
            Ok(text) => format!("{RESPONSE_OK}\n{text}"),
            Err(e) => format!("{RESPONSE_ERROR}: {e}\n"),
        })
    }

    /// Call `exit()` on every plugin and poison the runners.
    pub async fn shutdown_plugins(&self) {
        let instances: Vec<(String, PluginInstance)> = {
            let table = self.plugins.read().await;
            table
                .order
                .iter()
                .filter_map(|name| {
                    table
                        .slots
                        .get(name)
                        .map(|slot| (name.clone(), slot.instance.clone()))
                })
                .collect()
        };

        let exits = instances.into_iter().map(|(name, instance)| async move {
            if let Err(e) = instance.lock().await.exit().await {
                warn!("Error during {name} exit: {e}");
            }
        });
        if timeout(TASK_TIMEOUT / 2, futures_util::future::join_all(exits))
            .await
            .is_err()
        {
            warn!("Timed out waiting for plugins to exit");
        }

        let table = self.plugins.read().await;
        for slot in table.slots.values() {
            let _ = slot.queue.send(None);
            slot.runner.abort();
        }
    }
}

async fn run_job(
    name: &str,
    instance: &PluginInstance,
    proxy: &BackendProxy,
    stop: &watch::Sender<bool>,
    handler: &str,
    args: &str,
) -> (bool, String) {
    debug!(plugin = name, "{handler}({args})");
    let mut plugin = instance.lock().await;

    let result: Result<String> = if let Some(cmd) = handler.strip_prefix("run_") {
        plugin
            .on_command(cmd, args)
            .await
            .map(Option::unwrap_or_default)
    } else {
        plugin.on_event(handler, args).await.map(|()| String::new())
    };
    drop(plugin);

    match result {
        Ok(body) => (true, body),
        Err(e) => {
            error!("{name}::{handler}({args}) failed: {e}");
            let error_msg = format!("{name}::{handler}: {e}");
            let _ = proxy.notify_error(&format!("Pypr error {error_msg}")).await;
            if strict_mode() {
                error!("Strict mode: shutting down after handler failure");
                let _ = stop.send(true);
            }
            (false, error_msg)
        }
    }
}
