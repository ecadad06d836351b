//! # Task record and status snapshots.
//!
//! [`TaskRecord`] is the mutable state owned by one task handle. It is plain data:
//! the transitions below are the only mutations and every one of them is applied by
//! the handle under its write lock.
//!
//! ```text
//! Pending ──(spawn confirmed, pid known)──► Running ──(wait ok)────► Exited
//!                                              └─────(wait error)──► Unknown
//! ```
//!
//! ## Rules
//! - `completed_at` is set iff the state is `Exited` or `Unknown`
//! - `pid` is set once when entering `Running` and never changes afterwards
//! - `Exited` and `Unknown` are absorbing; later transitions are ignored

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::TaskRequest;

/// Exit code recorded when a process terminated without a coded exit status.
pub const DEFAULT_EXIT_CODE: i32 = 255;

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawn requested, not yet confirmed.
    Pending,
    /// Process observed started.
    Running,
    /// Process terminated; exit code and signal are known.
    Exited,
    /// Process terminated but its outcome could not be determined.
    Unknown,
}

impl TaskState {
    /// Returns true for the absorbing states.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Exited | TaskState::Unknown)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Exited => "exited",
            TaskState::Unknown => "unknown",
        }
    }
}

/// Terminal outcome of a task.
///
/// Either a normal exit (`exit_code`, optional `signal`) or an `error`; never both.
/// When `error` is set the process outcome is unknown and `exit_code` carries no
/// meaning (it is 0); read the code through [`ExitResult::code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResult {
    /// Numeric exit code ([`DEFAULT_EXIT_CODE`] when the process died from a signal).
    /// Meaningless when `error` is set.
    pub exit_code: i32,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
    /// Why the outcome is unknown.
    pub error: Option<String>,
}

impl ExitResult {
    /// A normal termination.
    pub fn exited(exit_code: i32, signal: Option<i32>) -> Self {
        Self {
            exit_code,
            signal,
            error: None,
        }
    }

    /// An outcome that could not be determined.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            signal: None,
            error: Some(error.into()),
        }
    }

    /// The exit code, or `None` when the outcome could not be determined.
    pub fn code(&self) -> Option<i32> {
        match self.error {
            Some(_) => None,
            None => Some(self.exit_code),
        }
    }

    /// Returns true for a zero exit code without signal or error.
    pub fn successful(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none() && self.error.is_none()
    }
}

/// Mutable state of one supervised task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub(crate) id: String,
    pub(crate) request: TaskRequest,
    pub(crate) state: TaskState,
    pub(crate) pid: Option<u32>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) exit: Option<ExitResult>,
}

impl TaskRecord {
    /// Creates a record for a spawn that has not been confirmed yet.
    pub(crate) fn pending(request: TaskRequest) -> Self {
        Self {
            id: request.id.clone(),
            request,
            state: TaskState::Pending,
            pid: None,
            started_at: None,
            completed_at: None,
            exit: None,
        }
    }

    /// `Pending → Running`. Ignored unless the record is pending.
    pub(crate) fn mark_running(&mut self, pid: u32, started_at: DateTime<Utc>) {
        if self.state != TaskState::Pending {
            return;
        }
        self.state = TaskState::Running;
        self.pid = Some(pid);
        self.started_at = Some(started_at);
    }

    /// `Running → Exited | Unknown`, chosen by whether the result carries an error.
    ///
    /// Returns false when the record was already terminal.
    pub(crate) fn complete(&mut self, result: ExitResult) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = if result.error.is_some() {
            TaskState::Unknown
        } else {
            TaskState::Exited
        };
        self.completed_at = Some(now_millis());
        self.exit = Some(result);
        true
    }

    /// Immutable copy of the record for callers.
    pub(crate) fn snapshot(&self) -> TaskStatus {
        let mut driver_attributes = BTreeMap::new();
        if let Some(pid) = self.pid {
            driver_attributes.insert("pid".to_string(), pid.to_string());
        }
        TaskStatus {
            id: self.id.clone(),
            name: self.request.name.clone(),
            state: self.state,
            started_at: self.started_at,
            completed_at: self.completed_at,
            exit_result: self.exit.clone(),
            driver_attributes,
        }
    }
}

/// Snapshot of a task returned by `InspectTask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task id.
    pub id: String,
    /// Task name.
    pub name: String,
    /// Lifecycle state.
    pub state: TaskState,
    /// When the process was observed started (millisecond precision).
    pub started_at: Option<DateTime<Utc>>,
    /// When the terminal state was entered.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal outcome.
    pub exit_result: Option<ExitResult>,
    /// Driver-specific details (`pid`).
    pub driver_attributes: BTreeMap<String, String>,
}

impl TaskStatus {
    /// Process id reported in the driver attributes.
    pub fn pid(&self) -> Option<u32> {
        self.driver_attributes.get("pid").and_then(|p| p.parse().ok())
    }
}

/// Current time rounded to milliseconds.
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().round_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::pending(TaskRequest::new("t1", "web", "/tmp"))
    }

    #[test]
    fn test_running_sets_pid_once() {
        let mut r = record();
        let at = now_millis();
        r.mark_running(42, at);
        r.mark_running(43, now_millis());

        assert_eq!(r.state, TaskState::Running);
        assert_eq!(r.pid, Some(42));
        assert_eq!(r.started_at, Some(at));
        assert!(r.completed_at.is_none());
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut r = record();
        r.mark_running(42, now_millis());

        assert!(r.complete(ExitResult::exited(137, None)));
        assert!(!r.complete(ExitResult::failed("late")));
        assert_eq!(r.exit.as_ref().and_then(ExitResult::code), Some(137));

        assert_eq!(r.state, TaskState::Exited);
        assert_eq!(r.exit, Some(ExitResult::exited(137, None)));
        assert!(r.completed_at.is_some());
    }

    #[test]
    fn test_wait_error_is_unknown() {
        let mut r = record();
        r.mark_running(7, now_millis());
        r.complete(ExitResult::failed("reap failed"));

        let status = r.snapshot();
        assert_eq!(status.state, TaskState::Unknown);
        assert_eq!(status.pid(), Some(7));
        let exit = status.exit_result.clone().unwrap();
        assert_eq!(exit.code(), None);
        assert!(!exit.successful());
        assert_eq!(
            status.exit_result.and_then(|e| e.error),
            Some("reap failed".to_string())
        );
    }

    #[test]
    fn test_started_at_has_millisecond_precision() {
        let at = now_millis();
        assert_eq!(at.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
