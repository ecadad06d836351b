//! Error types used by the procvisor driver and its process launcher.
//!
//! This module defines two main error enums:
//!
//! - [`DriverError`] — errors surfaced to the orchestrator by driver operations.
//! - [`LaunchError`] — failures to bring up (or reattach to) the workload process.
//!
//! Both types provide `as_label` for logs/metrics. No error is retried
//! internally: every failure is handed to the immediate caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced by driver operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DriverError {
    /// The operation referenced a task ID that is not registered.
    #[error("task with ID {id:?} not found")]
    TaskNotFound {
        /// The unknown task ID.
        id: String,
    },

    /// A task with this ID is already registered.
    #[error("task with ID {id:?} already started")]
    AlreadyStarted {
        /// The duplicated task ID.
        id: String,
    },

    /// The workload process could not be spawned or reattached.
    #[error("unable to start task {id:?}: {source}")]
    LaunchFailed {
        /// Task whose start failed.
        id: String,
        /// Underlying launch failure.
        #[source]
        source: LaunchError,
    },

    /// The kill signal could not be delivered, or the wait reported an abnormal error.
    #[error("shutdown of task {id:?} failed: {reason}")]
    ShutdownFailed {
        /// Task that failed to shut down.
        id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// `DestroyTask` without `force` on a task that is still running.
    #[error("cannot destroy running task {id:?}")]
    DestroyRunning {
        /// The running task.
        id: String,
    },

    /// Driver or task configuration could not be decoded or failed validation.
    #[error("failed to decode driver config: {reason}")]
    ConfigDecode {
        /// Decoder/validation message.
        reason: String,
    },

    /// Persisted task state could not be decoded.
    #[error("failed to decode task state from handle: {reason}")]
    StateDecode {
        /// Decoder message.
        reason: String,
    },

    /// The wrapped runtime does not support this operation.
    #[error("{runtime} driver does not support {operation}")]
    Unsupported {
        /// Runtime name.
        runtime: String,
        /// Operation name (`signals`, `exec`).
        operation: &'static str,
    },

    /// A signal could not be parsed or delivered.
    #[error("failed to signal task {id:?}: {reason}")]
    SignalFailed {
        /// Target task.
        id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// An exec command could not be run inside the task.
    #[error("exec in task {id:?} failed: {reason}")]
    ExecFailed {
        /// Target task.
        id: String,
        /// Human-readable cause.
        reason: String,
    },
}

impl DriverError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::DriverError;
    ///
    /// let err = DriverError::TaskNotFound { id: "t1".into() };
    /// assert_eq!(err.as_label(), "task_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverError::TaskNotFound { .. } => "task_not_found",
            DriverError::AlreadyStarted { .. } => "task_already_started",
            DriverError::LaunchFailed { .. } => "task_launch_failed",
            DriverError::ShutdownFailed { .. } => "task_shutdown_failed",
            DriverError::DestroyRunning { .. } => "task_destroy_running",
            DriverError::ConfigDecode { .. } => "config_decode",
            DriverError::StateDecode { .. } => "state_decode",
            DriverError::Unsupported { .. } => "unsupported",
            DriverError::SignalFailed { .. } => "task_signal_failed",
            DriverError::ExecFailed { .. } => "task_exec_failed",
        }
    }

    pub(crate) fn not_found(id: &str) -> Self {
        DriverError::TaskNotFound { id: id.to_string() }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        DriverError::ConfigDecode {
            reason: reason.into(),
        }
    }

    pub(crate) fn state(reason: impl Into<String>) -> Self {
        DriverError::StateDecode {
            reason: reason.into(),
        }
    }
}

/// # Errors produced while launching or reattaching a workload process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The runtime binary could not be resolved.
    #[error("failed to resolve path to {name:?} executable: {reason}")]
    BinaryNotFound {
        /// Binary name or path that was looked up.
        name: String,
        /// Resolver message.
        reason: String,
    },

    /// A stdout/stderr sink could not be opened.
    #[error("failed to open {stream} sink {path:?}: {source}")]
    Stdio {
        /// `stdout` or `stderr`.
        stream: &'static str,
        /// Sink path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The child process could not be spawned.
    #[error("failed to spawn {binary:?}: {source}")]
    Spawn {
        /// Binary that was executed.
        binary: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The child was spawned but its PID was not observable.
    #[error("spawned process has no pid")]
    MissingPid,

    /// A persisted process is no longer alive (or its pid now belongs to another
    /// process), so it cannot be reattached.
    #[error("process {pid} is no longer running")]
    ProcessGone {
        /// PID recorded at start.
        pid: u32,
    },

    /// The launch activity ended before reporting a result.
    #[error("launch aborted: {reason}")]
    Aborted {
        /// Join failure of the launch activity.
        reason: String,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::BinaryNotFound { .. } => "launch_binary_not_found",
            LaunchError::Stdio { .. } => "launch_stdio",
            LaunchError::Spawn { .. } => "launch_spawn",
            LaunchError::MissingPid => "launch_missing_pid",
            LaunchError::ProcessGone { .. } => "launch_process_gone",
            LaunchError::Aborted { .. } => "launch_aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroy_running_message() {
        let err = DriverError::DestroyRunning { id: "web".into() };
        assert!(err.to_string().contains("cannot destroy running task"));
        assert_eq!(err.as_label(), "task_destroy_running");
    }

    #[test]
    fn test_launch_failed_keeps_source() {
        let err = DriverError::LaunchFailed {
            id: "web".into(),
            source: LaunchError::ProcessGone { pid: 42 },
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("process 42 is no longer running"));
    }
}
