//! # LogWriter — tracing-backed event logger
//!
//! A minimal subscriber that renders incoming [`TaskEvent`]s as `tracing` records
//! under the `procvisor::events` target.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO procvisor::events: task started task="web-1" pid=4242
//! WARN procvisor::events: kill sent task="web-1" pid=4242
//! INFO procvisor::events: task exited task="web-1" pid=4242 exit_code=137
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{EventKind, TaskEvent};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &TaskEvent) {
        let task = e.task.as_deref().unwrap_or("-");
        let message = e.message.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TaskStarted => {
                info!(target: "procvisor::events", task, pid = ?e.pid, "task started");
            }
            EventKind::TaskRecovered => {
                info!(target: "procvisor::events", task, pid = ?e.pid, "task recovered");
            }
            EventKind::TaskExited => {
                info!(
                    target: "procvisor::events",
                    task,
                    pid = ?e.pid,
                    exit_code = ?e.exit_code,
                    signal = ?e.annotations.get("signal"),
                    "task exited"
                );
            }
            EventKind::TaskLost => {
                warn!(target: "procvisor::events", task, pid = ?e.pid, message, "task lost");
            }
            EventKind::StopRequested => {
                info!(
                    target: "procvisor::events",
                    task,
                    timeout_ms = ?e.annotations.get("timeout_ms"),
                    "stop requested"
                );
            }
            EventKind::KillSent => {
                warn!(target: "procvisor::events", task, pid = ?e.pid, "kill sent");
            }
            EventKind::SignalSent => {
                info!(
                    target: "procvisor::events",
                    task,
                    signal = ?e.annotations.get("signal"),
                    "signal sent"
                );
            }
            EventKind::TaskDestroyed => {
                info!(
                    target: "procvisor::events",
                    task,
                    forced = ?e.annotations.get("forced"),
                    "task destroyed"
                );
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "procvisor::events", subscriber = task, message, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "procvisor::events", subscriber = task, message, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
