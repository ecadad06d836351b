//! # procvisor
//!
//! **Procvisor** is a task driver core for cluster orchestrators: it launches
//! externally isolated workloads through a wrapped runtime binary (Singularity, or
//! any plain executable), supervises their lifecycle, reports health, and tears them
//! down correctly on stop, timeout or crash.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  orchestrator ── start/stop/wait/destroy/inspect/recover/fingerprint/events ──┐
//!                                                                              ▼
//! ┌───────────────────────────────────────────────────────────────────────────────┐
//! │  Driver<R: Runtime>                                                           │
//! │  - DriverConfig (watch channel, set_config)                                   │
//! │  - TaskStore (id → TaskHandle, per-id reservation while launching)            │
//! │  - Bus (broadcast events)                                                     │
//! │  - CancellationToken (process-wide shutdown)                                  │
//! └──────┬──────────────────┬──────────────────┬────────────────────┬─────────────┘
//!        ▼                  ▼                  ▼                    ▼
//!   ┌────────────┐     ┌────────────┐     ┌────────────┐     ┌──────────────┐
//!   │ TaskHandle │     │ TaskHandle │     │ TaskHandle │     │HealthMonitor │
//!   │  + watcher │     │  + watcher │     │ + reattach │     │ (probe loop) │
//!   └─────┬──────┘     └─────┬──────┘     └─────┬──────┘     └──────────────┘
//!         │ TaskExited       │ TaskLost         │ ...
//!         ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                                │
//! │                 (capacity: DriverConfig::bus_capacity)                        │
//! └───────────┬───────────────────────────────────────────────┬───────────────────┘
//!             ▼                                               ▼
//!    Driver::task_events(ctx)                      subscriber_listener
//!    (one stream per caller)                      SubscriberSet (per-sub queues)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! Pending ──spawn ok──► Running ──wait ok────► Exited   (exit code, signal)
//!    │                     └─────wait error──► Unknown  (error recorded)
//!    └──spawn failed──► start_task returns LaunchFailed, nothing registered
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                        |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------|
//! | **Driver**        | Orchestrator-facing operations.                              | [`Driver`], [`DriverBuilder`]             |
//! | **Runtimes**      | Capability set of one wrapped runtime.                       | [`Runtime`], [`Singularity`], [`RawExec`] |
//! | **Supervision**   | Per-task state machine, exit results, status snapshots.      | [`TaskHandle`], [`TaskStatus`]            |
//! | **Health**        | Periodic fingerprint of the runtime binary.                  | [`HealthSnapshot`], [`HealthState`]       |
//! | **Events**        | Lifecycle events, pull streams and push subscribers.         | [`TaskEvent`], [`Subscribe`]              |
//! | **Recovery**      | Versioned handle to reattach after a host restart.           | [`DriverHandle`]                          |
//! | **Errors**        | Typed errors with stable labels.                             | [`DriverError`], [`LaunchError`]          |
//! | **Configuration** | Typed plugin configuration with defaults.                    | [`DriverConfig`]                          |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use procvisor::{Driver, DriverConfig, RawExec, TaskRequest, TaskState};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::builder(RawExec)
//!         .with_config(DriverConfig::default())
//!         .build();
//!
//!     let request = TaskRequest::new("hello-1", "hello", std::env::temp_dir())
//!         .with_driver_config(serde_json::json!({ "args": ["-c", "exit 3"] }));
//!     driver.start_task(request).await?;
//!
//!     let mut exit = driver.wait_task("hello-1", CancellationToken::new()).await?;
//!     let result = exit.recv().await.expect("task exits");
//!     assert_eq!(result.exit_code, 3);
//!
//!     let status = driver.inspect_task("hello-1").await?;
//!     assert_eq!(status.state, TaskState::Exited);
//!
//!     driver.destroy_task("hello-1", false).await?;
//!     driver.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod runtime;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    Attribute, DEFAULT_EXIT_CODE, Driver, DriverBuilder, DriverConfig, DriverHandle, ExecResult,
    ExitResult, HANDLE_VERSION, HealthSnapshot, HealthState, LaunchSpec, PersistedState,
    PluginInfo, ProcessHandle, ResourceUsage, StdioSink, StopOutcome, TaskHandle, TaskState,
    TaskStatus, TaskStore, decode_exit, launch, probe_binary,
};
pub use error::{DriverError, LaunchError};
pub use events::{Bus, EventKind, TaskEvent};
pub use runtime::{
    Capabilities, FsIsolation, RawExec, RawExecConfig, Resources, Runtime, Singularity,
    SingularityConfig, TaskRequest,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
