//! # TaskHandle: the in-process owner of one task.
//!
//! A handle owns the task's [`TaskRecord`] and the exit notification channel. The
//! supervision activity (see `actor`) is the only writer; any number of callers read.
//!
//! ## Architecture
//! ```text
//! exit watcher ──complete(result)──► record.write()  (Running → Exited | Unknown)
//!                                         │
//!                                         └─► exit_tx.send(Some(result))
//!                                                  │
//!          wait_exit() / shutdown() ◄──────────────┘
//! status() / is_running() ──► record.read()
//! ```
//!
//! ## Rules
//! - exit notification is sent only after the record holds the terminal state
//! - `pid` never changes; it is readable without locking
//! - `shutdown` on a terminated task is a no-op success
//! - a process that is already gone is never a signal error

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::core::launcher::send_signal;
use crate::core::record::{ExitResult, TaskRecord, TaskStatus};
use crate::core::stats::{self, ResourceUsage};
use crate::error::DriverError;
use crate::runtime::TaskRequest;

/// How a `shutdown` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The task had already terminated when shutdown was called.
    AlreadyExited,
    /// The process terminated within the timeout.
    Exited,
    /// The timeout elapsed and `SIGKILL` was delivered.
    Killed,
    /// The driver shut down while waiting.
    Cancelled,
}

/// Supervisor of one running task.
#[derive(Debug)]
pub struct TaskHandle {
    id: Arc<str>,
    pid: u32,
    start_time: Option<u64>,
    reattached: bool,
    record: RwLock<TaskRecord>,
    exit_tx: watch::Sender<Option<ExitResult>>,
}

impl TaskHandle {
    /// Creates a handle for a process whose spawn was confirmed (or which was found alive).
    pub(crate) fn running(
        request: TaskRequest,
        pid: u32,
        start_time: Option<u64>,
        started_at: DateTime<Utc>,
        reattached: bool,
    ) -> Arc<Self> {
        let id: Arc<str> = Arc::from(request.id.as_str());
        let mut record = TaskRecord::pending(request);
        record.mark_running(pid, started_at);
        let (exit_tx, _) = watch::channel(None);

        Arc::new(Self {
            id,
            pid,
            start_time,
            reattached,
            record: RwLock::new(record),
            exit_tx,
        })
    }

    /// Task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Workload process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Kernel start time of the process, used to tell it apart from a later process
    /// with the same pid.
    pub fn start_time(&self) -> Option<u64> {
        self.start_time
    }

    /// True when the handle was rebuilt by RecoverTask rather than spawned here.
    pub fn is_reattached(&self) -> bool {
        self.reattached
    }

    /// Snapshot of the record.
    pub async fn status(&self) -> TaskStatus {
        self.record.read().await.snapshot()
    }

    /// True while the state is `Running`.
    pub async fn is_running(&self) -> bool {
        self.record.read().await.state == crate::core::record::TaskState::Running
    }

    /// The request the task was started with.
    pub async fn request(&self) -> TaskRequest {
        self.record.read().await.request.clone()
    }

    /// Records the terminal outcome, then notifies waiters.
    ///
    /// Returns false when the task had already terminated.
    pub(crate) async fn complete(&self, result: ExitResult) -> bool {
        let changed = self.record.write().await.complete(result.clone());
        if changed {
            self.exit_tx.send_replace(Some(result));
        }
        changed
    }

    /// Waits until the task terminates and returns its outcome.
    pub async fn wait_exit(&self) -> Option<ExitResult> {
        let mut rx = self.exit_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone(),
            Err(_) => None,
        }
    }

    fn current_exit(&self) -> Option<ExitResult> {
        self.exit_tx.borrow().clone()
    }

    /// Delivers `sig` to the process. No-op once the task has terminated.
    pub fn signal(&self, sig: Signal) -> Result<(), DriverError> {
        if self.current_exit().is_some() {
            return Ok(());
        }
        send_signal(self.pid, sig).map_err(|e| DriverError::SignalFailed {
            id: self.id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Delivers `SIGKILL`.
    pub(crate) fn kill(&self) -> Result<(), DriverError> {
        if self.current_exit().is_some() {
            return Ok(());
        }
        send_signal(self.pid, Signal::SIGKILL).map_err(|e| DriverError::ShutdownFailed {
            id: self.id.to_string(),
            reason: format!("failed to kill process {}: {e}", self.pid),
        })
    }

    /// Races the process's own exit against `timeout`, killing it when the timeout wins.
    ///
    /// Succeeds once the process exited or `SIGKILL` was delivered. Fails when the kill
    /// could not be delivered or the wait reported an error for a process spawned here.
    pub async fn shutdown(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<StopOutcome, DriverError> {
        if self.current_exit().is_some() {
            return Ok(StopOutcome::AlreadyExited);
        }

        let mut rx = self.exit_tx.subscribe();
        tokio::select! {
            _ = cancel.cancelled() => Ok(StopOutcome::Cancelled),
            exit = rx.wait_for(Option::is_some) => {
                let exit = exit.ok().and_then(|e| e.clone());
                self.check_exit(exit)
            }
            _ = tokio::time::sleep(timeout) => {
                self.kill()?;
                Ok(StopOutcome::Killed)
            }
        }
    }

    // Reattached processes always end with an unavailable exit status; that is not a wait failure.
    fn check_exit(&self, exit: Option<ExitResult>) -> Result<StopOutcome, DriverError> {
        match exit.and_then(|e| e.error) {
            Some(reason) if !self.reattached => Err(DriverError::ShutdownFailed {
                id: self.id.to_string(),
                reason,
            }),
            _ => Ok(StopOutcome::Exited),
        }
    }

    /// Resource usage samples taken every `interval` until the process is gone.
    pub fn stats(
        &self,
        interval: Duration,
        ctx: CancellationToken,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<ResourceUsage> {
        stats::spawn_sampler(self.pid, interval, ctx, shutdown)
    }
}
