//! # Exit watchers: the per-task supervision activity.
//!
//! Every registered task has exactly one watcher driving its handle from `Running`
//! to a terminal state.
//!
//! ```text
//! spawned here:   ProcessHandle::wait() ──Ok(status)──► decode_exit ──► Exited  + TaskExited
//!                                       └─Err(e)──────────────────────► Unknown + TaskLost
//!
//! reattached:     loop { sleep(poll); process_matches(pid, start_time)? } ──gone──► Unknown + TaskLost
//! ```
//!
//! ## Rules
//! - the watcher is the only writer of its handle's record
//! - driver shutdown ends the watcher without touching the process or the record
//! - a reattached process is not our child, so its exit status cannot be reaped
//! - a reattached pid taken over by another process counts as gone

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::handle::TaskHandle;
use crate::core::launcher::{ProcessHandle, decode_exit, process_matches};
use crate::core::record::ExitResult;
use crate::events::{Bus, EventKind, TaskEvent};

/// Error stored for reattached processes once they are gone.
const REATTACHED_EXIT: &str = "process exited while reattached; exit status unavailable";

/// Waits on a child spawned by this driver.
pub(crate) fn watch_child(
    handle: Arc<TaskHandle>,
    process: ProcessHandle,
    bus: Bus,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(task_id = handle.id(), pid = handle.pid(), "exit watcher stopped by driver shutdown");
                return;
            }
            status = process.wait() => match status {
                Ok(status) => decode_exit(status),
                Err(e) => ExitResult::failed(format!("failed to wait on process: {e}")),
            },
        };
        finish(&handle, result, &bus).await;
    })
}

/// Polls liveness of a process recovered from persisted state.
pub(crate) fn watch_reattached(
    handle: Arc<TaskHandle>,
    poll: Duration,
    bus: Bus,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(poll) => {}
            }
            if !process_matches(handle.pid(), handle.start_time()) {
                break;
            }
        }
        finish(&handle, ExitResult::failed(REATTACHED_EXIT), &bus).await;
    })
}

async fn finish(handle: &TaskHandle, result: ExitResult, bus: &Bus) {
    if !handle.complete(result.clone()).await {
        return;
    }

    match &result.error {
        None => {
            info!(
                task_id = handle.id(),
                pid = handle.pid(),
                exit_code = result.exit_code,
                signal = ?result.signal,
                "task exited"
            );
            let mut ev = TaskEvent::new(EventKind::TaskExited)
                .with_task(handle.id())
                .with_pid(handle.pid())
                .with_exit_code(result.exit_code);
            if let Some(sig) = result.signal {
                ev = ev.with_annotation("signal", sig);
            }
            bus.publish(ev);
        }
        Some(err) => {
            warn!(task_id = handle.id(), pid = handle.pid(), error = %err, "task lost");
            bus.publish(
                TaskEvent::new(EventKind::TaskLost)
                    .with_task(handle.id())
                    .with_pid(handle.pid())
                    .with_message(err.as_str()),
            );
        }
    }
}
