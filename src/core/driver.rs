//! # Driver: the orchestrator-facing façade.
//!
//! [`Driver`] composes the task store, the per-task handles and exit watchers, the
//! health monitor and the event bus behind the operations the orchestrator calls.
//!
//! ## Architecture
//! ```text
//! start_task(request)
//!   ├─► decode driver_config into R::Config, validate against DriverConfig
//!   ├─► resolve runtime binary, build argv
//!   ├─► TaskStore::reserve(id)                 (AlreadyStarted for a taken id)
//!   ├─► launch activity: launch on the blocking pool, outside the store lock
//!   │     ├─ ok  ─► TaskStore::commit + publish TaskStarted + watch_child
//!   │     └─ err ─► TaskStore::release ──► LaunchFailed
//!   └─► PersistedState::encode ──► DriverHandle (written once per start)
//!
//! wait_task ──► bridge activity ──► handle.wait_exit() ──► one ExitResult, then close
//! stop_task ──► [graceful signal] ──► handle.shutdown(timeout) ──► KillSent on timeout
//! destroy_task ──► running? (force → SIGKILL | DestroyRunning) ──► TaskStore::delete
//! recover_task ──► DriverHandle::decode ──► same process alive? ──► TaskHandle + watch_reattached
//! fingerprint ──► HealthMonitor loop      task_events ──► Bus::stream
//! ```
//!
//! ## Rules
//! - every background activity selects on the driver token; `shutdown()` ends them all
//!   without touching running workloads
//! - errors are returned to the caller; nothing is retried internally
//! - a slow launch only holds its own id; other tasks stay reachable

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::actor;
use crate::core::builder::DriverBuilder;
use crate::core::config::DriverConfig;
use crate::core::fingerprint::{HealthMonitor, HealthSnapshot};
use crate::core::handle::{StopOutcome, TaskHandle};
use crate::core::launcher::{
    LaunchSpec, decode_exit, launch, parse_signal, process_matches, resolve_binary,
};
use crate::core::record::{ExitResult, TaskStatus, now_millis};
use crate::core::registry::TaskStore;
use crate::core::shutdown;
use crate::core::state::{DriverHandle, PersistedState};
use crate::core::stats::ResourceUsage;
use crate::error::{DriverError, LaunchError};
use crate::events::{Bus, EventKind, TaskEvent};
use crate::runtime::{Capabilities, Runtime, TaskRequest};
use crate::subscribers::SubscriberSet;

/// Plugin API versions this driver speaks.
const API_VERSIONS: &[&str] = &["0.1.0"];

/// Identity reported to the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// Runtime name.
    pub name: String,
    /// Crate version.
    pub plugin_version: &'static str,
    /// Supported plugin API versions.
    pub api_versions: Vec<&'static str>,
}

/// Output of a command run with `exec_task`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

/// Task driver for one wrapped runtime.
pub struct Driver<R: Runtime> {
    runtime: R,
    config: watch::Sender<Option<Arc<DriverConfig>>>,
    tasks: Arc<TaskStore<Arc<TaskHandle>>>,
    bus: Bus,
    token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Runtime> Driver<R> {
    /// Starts building a driver for `runtime`.
    pub fn builder(runtime: R) -> DriverBuilder<R> {
        DriverBuilder::new(runtime)
    }

    pub(crate) fn new_internal(
        runtime: R,
        config: Option<DriverConfig>,
        bus: Bus,
        subscribers: Option<SubscriberSet>,
    ) -> Self {
        let (config, _) = watch::channel(config.map(Arc::new));
        let token = CancellationToken::new();
        let listener = subscribers
            .filter(|set| !set.is_empty())
            .map(|set| Self::subscriber_listener(bus.subscribe(), set, token.clone()));

        Self {
            runtime,
            config,
            tasks: Arc::new(TaskStore::new()),
            bus,
            token,
            listener: Mutex::new(listener),
        }
    }

    /// Forwards bus events to the subscriber set until the driver shuts down.
    fn subscriber_listener(
        mut rx: broadcast::Receiver<TaskEvent>,
        set: SubscriberSet,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged; events dropped");
                        }
                    }
                }
            }
            set.shutdown().await;
        })
    }

    /// Identity of this plugin.
    pub fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            name: self.runtime.name().to_string(),
            plugin_version: env!("CARGO_PKG_VERSION"),
            api_versions: API_VERSIONS.to_vec(),
        }
    }

    /// Optional features of the wrapped runtime.
    pub fn capabilities(&self) -> Capabilities {
        self.runtime.capabilities()
    }

    /// Decodes and applies a plugin config blob. An empty blob applies the defaults.
    pub fn set_config(&self, blob: &[u8]) -> Result<(), DriverError> {
        let config = DriverConfig::decode(blob)?;
        info!(
            runtime = self.runtime.name(),
            enabled = config.enabled,
            volumes_enabled = config.volumes_enabled,
            runtime_path = ?config.runtime_path,
            "driver config applied"
        );
        self.config.send_replace(Some(Arc::new(config)));
        Ok(())
    }

    /// The applied config, if any.
    pub fn config(&self) -> Option<Arc<DriverConfig>> {
        self.config.borrow().clone()
    }

    fn effective_config(&self) -> Arc<DriverConfig> {
        self.config().unwrap_or_default()
    }

    async fn lookup(&self, id: &str) -> Result<Arc<TaskHandle>, DriverError> {
        self.tasks.get(id).await.ok_or_else(|| DriverError::not_found(id))
    }

    fn decode_task_config(
        &self,
        request: &TaskRequest,
        config: &DriverConfig,
    ) -> Result<R::Config, DriverError> {
        let raw = match &request.driver_config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        let task_config: R::Config =
            serde_json::from_value(raw).map_err(|e| DriverError::config(e.to_string()))?;
        self.runtime
            .validate(&task_config, config)
            .map_err(DriverError::config)?;
        Ok(task_config)
    }

    fn runtime_binary(&self, config: &DriverConfig) -> Result<std::path::PathBuf, LaunchError> {
        resolve_binary(config.runtime_path.as_deref(), self.runtime.default_binary())
    }

    /// Launches a task and returns the handle the orchestrator persists for recovery.
    ///
    /// Fails with `AlreadyStarted` when the id is registered or being started,
    /// `ConfigDecode` when the task config is invalid, and `LaunchFailed` when the
    /// process cannot be spawned. A failed start leaves nothing registered.
    pub async fn start_task(&self, request: TaskRequest) -> Result<DriverHandle, DriverError> {
        let config = self.effective_config();
        let task_config = self.decode_task_config(&request, &config)?;
        let id = request.id.clone();

        let binary = self
            .runtime_binary(&config)
            .map_err(|source| DriverError::LaunchFailed {
                id: id.clone(),
                source,
            })?;
        let argv = self.runtime.build_argv(&task_config);
        debug!(task_id = %id, binary = %binary.display(), ?argv, "launching task");
        let spec = LaunchSpec::for_request(binary, argv, &request);

        self.tasks.reserve(&id).await?;
        // Detached so that a caller dropping this future cannot leave the id reserved.
        let starting = tokio::spawn(launch_reserved(
            Arc::clone(&self.tasks),
            self.bus.clone(),
            self.token.clone(),
            spec,
            request,
        ));
        let handle = starting.await.map_err(|e| DriverError::LaunchFailed {
            id: id.clone(),
            source: LaunchError::Aborted {
                reason: e.to_string(),
            },
        })??;

        let status = handle.status().await;
        PersistedState {
            task_id: id,
            request: handle.request().await,
            pid: handle.pid(),
            start_time: handle.start_time(),
            started_at: status.started_at.unwrap_or_else(now_millis),
        }
        .encode()
    }

    /// Returns a channel that receives the task's terminal result once, then closes.
    ///
    /// The channel closes without a value when `ctx` or the driver is cancelled first.
    pub async fn wait_task(
        &self,
        id: &str,
        ctx: CancellationToken,
    ) -> Result<mpsc::Receiver<ExitResult>, DriverError> {
        let handle = self.lookup(id).await?;
        let (tx, rx) = mpsc::channel(1);
        let shutdown = self.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = shutdown.cancelled() => {}
                exit = handle.wait_exit() => {
                    if let Some(exit) = exit {
                        let _ = tx.send(exit).await;
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Stops a task: optional graceful signal, then wait up to `timeout` before `SIGKILL`.
    pub async fn stop_task(
        &self,
        id: &str,
        timeout: Duration,
        signal: Option<&str>,
    ) -> Result<(), DriverError> {
        let handle = self.lookup(id).await?;
        self.bus.publish(
            TaskEvent::new(EventKind::StopRequested)
                .with_task(id)
                .with_annotation("timeout_ms", timeout.as_millis()),
        );

        if let Some(name) = signal.filter(|s| !s.trim().is_empty()) {
            self.send_graceful_signal(&handle, name);
        }

        match handle.shutdown(timeout, &self.token).await? {
            StopOutcome::Killed => {
                warn!(task_id = id, pid = handle.pid(), ?timeout, "stop timeout elapsed; process killed");
                self.bus.publish(
                    TaskEvent::new(EventKind::KillSent)
                        .with_task(id)
                        .with_pid(handle.pid()),
                );
            }
            outcome => debug!(task_id = id, ?outcome, "task stopped"),
        }
        Ok(())
    }

    // Failures here do not abort the stop; the kill escalation still applies.
    fn send_graceful_signal(&self, handle: &TaskHandle, name: &str) {
        if !self.capabilities().send_signals {
            debug!(task_id = handle.id(), "runtime cannot signal; skipping graceful signal");
            return;
        }
        let Some(sig) = parse_signal(name) else {
            warn!(task_id = handle.id(), signal = name, "unknown stop signal; skipping");
            return;
        };
        match handle.signal(sig) {
            Ok(()) => self.bus.publish(
                TaskEvent::new(EventKind::SignalSent)
                    .with_task(handle.id())
                    .with_annotation("signal", sig.as_str()),
            ),
            Err(e) => warn!(task_id = handle.id(), error = %e, "graceful stop signal failed"),
        }
    }

    /// Removes a task from the driver.
    ///
    /// A running task is refused with `DestroyRunning` unless `force` is set, in which
    /// case its process is killed first.
    pub async fn destroy_task(&self, id: &str, force: bool) -> Result<(), DriverError> {
        let handle = self.lookup(id).await?;

        if handle.is_running().await {
            if !force {
                return Err(DriverError::DestroyRunning { id: id.to_string() });
            }
            handle.kill()?;
            self.bus.publish(
                TaskEvent::new(EventKind::KillSent)
                    .with_task(id)
                    .with_pid(handle.pid()),
            );
        }

        self.tasks.delete(id).await;
        info!(task_id = id, force, "task destroyed");
        self.bus.publish(
            TaskEvent::new(EventKind::TaskDestroyed)
                .with_task(id)
                .with_annotation("forced", force),
        );
        Ok(())
    }

    /// Snapshot of a task.
    pub async fn inspect_task(&self, id: &str) -> Result<TaskStatus, DriverError> {
        Ok(self.lookup(id).await?.status().await)
    }

    /// Rebuilds a task from a handle returned by an earlier `start_task`, without re-spawning.
    ///
    /// Recovering an id that is already registered succeeds without changes. A process
    /// that is no longer alive, or whose pid now belongs to a process with another
    /// start time, yields `LaunchFailed` with [`LaunchError::ProcessGone`].
    pub async fn recover_task(&self, handle: &DriverHandle) -> Result<(), DriverError> {
        let state = handle.decode()?;
        let id = state.task_id.clone();
        if self.tasks.get(&id).await.is_some() {
            debug!(task_id = %id, "task already registered; nothing to recover");
            return Ok(());
        }

        let pid = state.pid;
        let start_time = state.start_time;
        let poll = self.effective_config().reattach_poll();
        let mut request = state.request;
        request.id = id.clone();

        let res = self
            .tasks
            .try_insert_with(&id, || {
                if !process_matches(pid, start_time) {
                    return Err(DriverError::LaunchFailed {
                        id: id.clone(),
                        source: LaunchError::ProcessGone { pid },
                    });
                }
                let handle = TaskHandle::running(request, pid, start_time, state.started_at, true);
                info!(task_id = %id, pid, "task recovered");
                self.bus.publish(
                    TaskEvent::new(EventKind::TaskRecovered)
                        .with_task(id.as_str())
                        .with_pid(pid),
                );
                actor::watch_reattached(
                    Arc::clone(&handle),
                    poll,
                    self.bus.clone(),
                    self.token.clone(),
                );
                Ok(handle)
            })
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(DriverError::AlreadyStarted { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Health snapshots: one immediately, then periodically and on config changes.
    pub fn fingerprint(&self, ctx: CancellationToken) -> mpsc::Receiver<HealthSnapshot> {
        HealthMonitor::new(&self.runtime, self.config.subscribe()).spawn(ctx, self.token.clone())
    }

    /// Lifecycle events published after this call, until `ctx` or the driver is cancelled.
    pub fn task_events(&self, ctx: CancellationToken) -> mpsc::Receiver<TaskEvent> {
        self.bus.stream(ctx, self.token.clone())
    }

    /// Resource usage of a task sampled every `interval`.
    pub async fn task_stats(
        &self,
        id: &str,
        interval: Duration,
        ctx: CancellationToken,
    ) -> Result<mpsc::Receiver<ResourceUsage>, DriverError> {
        let handle = self.lookup(id).await?;
        Ok(handle.stats(interval, ctx, self.token.clone()))
    }

    /// Delivers a named signal (`SIGHUP`, `HUP`, `1`) to a task.
    pub async fn signal_task(&self, id: &str, signal: &str) -> Result<(), DriverError> {
        if !self.capabilities().send_signals {
            return Err(self.unsupported("signals"));
        }
        let handle = self.lookup(id).await?;
        let sig = parse_signal(signal).ok_or_else(|| DriverError::SignalFailed {
            id: id.to_string(),
            reason: format!("unknown signal {signal:?}"),
        })?;

        handle.signal(sig)?;
        debug!(task_id = id, signal = sig.as_str(), "signal delivered");
        self.bus.publish(
            TaskEvent::new(EventKind::SignalSent)
                .with_task(id)
                .with_annotation("signal", sig.as_str()),
        );
        Ok(())
    }

    /// Runs `cmd` inside a running task's workload, bounded by `timeout`.
    pub async fn exec_task(
        &self,
        id: &str,
        cmd: &[String],
        timeout: Duration,
    ) -> Result<ExecResult, DriverError> {
        if !self.capabilities().exec {
            return Err(self.unsupported("exec"));
        }
        let handle = self.lookup(id).await?;
        let exec_failed = |reason: String| DriverError::ExecFailed {
            id: id.to_string(),
            reason,
        };
        if cmd.is_empty() {
            return Err(exec_failed("empty command".into()));
        }
        if !handle.is_running().await {
            return Err(exec_failed("task is not running".into()));
        }

        let request = handle.request().await;
        let config = self.effective_config();
        let task_config = self.decode_task_config(&request, &config)?;
        let argv = self
            .runtime
            .exec_argv(&task_config, cmd)
            .ok_or_else(|| self.unsupported("exec"))?;
        let binary = self
            .runtime_binary(&config)
            .map_err(|e| exec_failed(e.to_string()))?;

        let output = run_captured(&binary, &argv, &request);
        let out = tokio::select! {
            _ = self.token.cancelled() => return Err(exec_failed("driver is shutting down".into())),
            res = tokio::time::timeout(timeout, output) => match res {
                Err(_) => return Err(exec_failed(format!("timed out after {timeout:?}"))),
                Ok(Err(e)) => return Err(exec_failed(e.to_string())),
                Ok(Ok(out)) => out,
            },
        };

        Ok(ExecResult {
            exit_code: decode_exit(out.status).exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    fn unsupported(&self, operation: &'static str) -> DriverError {
        DriverError::Unsupported {
            runtime: self.runtime.name().to_string(),
            operation,
        }
    }

    /// Cancels every background activity of the driver. Running workloads are left alone.
    pub async fn shutdown(&self) {
        info!(runtime = self.runtime.name(), "driver shutting down");
        self.token.cancel();
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }

    /// Waits for SIGINT, SIGTERM or SIGQUIT (or an explicit shutdown), then shuts down.
    pub async fn run_until_signal(&self) -> std::io::Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => {}
            sig = shutdown::wait_for_shutdown_signal() => {
                let sig = sig?;
                info!(signal = sig, "termination signal received");
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// True once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

// Launches a task whose id is already reserved and either commits or releases it.
async fn launch_reserved(
    tasks: Arc<TaskStore<Arc<TaskHandle>>>,
    bus: Bus,
    token: CancellationToken,
    spec: LaunchSpec,
    request: TaskRequest,
) -> Result<Arc<TaskHandle>, DriverError> {
    let id = request.id.clone();
    let launched = tokio::task::spawn_blocking(move || launch(&spec))
        .await
        .unwrap_or_else(|e| {
            Err(LaunchError::Aborted {
                reason: e.to_string(),
            })
        });

    let process = match launched {
        Ok(process) => process,
        Err(source) => {
            tasks.release(&id).await;
            warn!(task_id = %id, error = %source, "task launch failed");
            return Err(DriverError::LaunchFailed { id, source });
        }
    };

    let handle = TaskHandle::running(request, process.pid, process.start_time, now_millis(), false);
    tasks.commit(&id, Arc::clone(&handle)).await;
    info!(task_id = %id, pid = process.pid, "task started");
    bus.publish(
        TaskEvent::new(EventKind::TaskStarted)
            .with_task(id.as_str())
            .with_pid(process.pid),
    );
    actor::watch_child(Arc::clone(&handle), process, bus, token);
    Ok(handle)
}

async fn run_captured(
    binary: &Path,
    argv: &[String],
    request: &TaskRequest,
) -> std::io::Result<std::process::Output> {
    Command::new(binary)
        .args(argv)
        .env_clear()
        .envs(&request.env)
        .current_dir(&request.task_dir)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
}
