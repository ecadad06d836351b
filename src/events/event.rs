//! # Lifecycle events emitted by the driver and its task watchers.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: the workload process starts, is reattached, exits or is lost
//! - **Control events**: stop/kill/signal/destroy requests applied to a task
//! - **Subscriber events**: delivery problems inside the in-process subscriber set
//!
//! The [`TaskEvent`] struct carries additional metadata such as timestamps, task id,
//! pid, exit code, a message and free-form annotations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use procvisor::{EventKind, TaskEvent};
//!
//! let ev = TaskEvent::new(EventKind::TaskExited)
//!     .with_task("web-1")
//!     .with_exit_code(137)
//!     .with_annotation("signal", "9");
//!
//! assert_eq!(ev.kind, EventKind::TaskExited);
//! assert_eq!(ev.task.as_deref(), Some("web-1"));
//! assert_eq!(ev.exit_code, Some(137));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of task events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `message`: panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `message`: reason string (`full`, `closed`)
    SubscriberOverflow,

    // === Task lifecycle events ===
    /// Workload process spawned and registered.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `pid`: process id
    TaskStarted,

    /// Supervisor rebuilt from persisted state for a still-alive process.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `pid`: process id
    TaskRecovered,

    /// Process terminated and its exit status was recorded.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `pid`: process id
    /// - `exit_code`: recorded exit code
    /// - `annotations["signal"]`: terminating signal, when there was one
    TaskExited,

    /// Process terminated but its outcome could not be determined.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `pid`: process id
    /// - `message`: wait error
    TaskLost,

    // === Control events ===
    /// Graceful stop requested with a timeout.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `annotations["timeout_ms"]`: stop timeout
    StopRequested,

    /// Stop timeout elapsed (or destroy was forced) and `SIGKILL` was delivered.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `pid`: process id
    KillSent,

    /// A signal was delivered to the process.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `annotations["signal"]`: signal name
    SignalSent,

    /// Task was removed from the registry.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `annotations["forced"]`: `true` when destroyed with force
    TaskDestroyed,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskRecovered => "task_recovered",
            EventKind::TaskExited => "task_exited",
            EventKind::TaskLost => "task_lost",
            EventKind::StopRequested => "stop_requested",
            EventKind::KillSent => "kill_sent",
            EventKind::SignalSent => "signal_sent",
            EventKind::TaskDestroyed => "task_destroyed",
        }
    }
}

/// Task event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct TaskEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    pub kind: EventKind,
    /// Task id (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Workload process id.
    pub pid: Option<u32>,
    /// Recorded exit code.
    pub exit_code: Option<i32>,
    /// Human-readable message.
    pub message: Option<Arc<str>>,
    /// Free-form key/value details.
    pub annotations: HashMap<String, String>,
}

impl TaskEvent {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            task: None,
            pid: None,
            exit_code: None,
            message: None,
            annotations: HashMap::new(),
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a human-readable message.
    #[inline]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds one annotation.
    #[inline]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.annotations.insert(key.into(), value.to_string());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        TaskEvent::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_message(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        TaskEvent::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_message(info)
    }

    /// Returns true for events produced by the subscriber set itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
