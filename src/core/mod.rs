//! Driver core: supervision engine and orchestrator-facing façade.
//!
//! The public entry point is [`Driver`]; the remaining exports are the types its
//! operations take and return.
//!
//! Internal modules:
//! - [`launcher`]: spawns the runtime process and decodes its wait status;
//! - [`actor`]: per-task exit watchers (owned child or reattached pid);
//! - [`handle`]: per-task state machine with status/wait/shutdown/signal;
//! - [`registry`]: concurrent id → handle store;
//! - [`fingerprint`]: periodic health probe of the runtime binary;
//! - [`state`]: versioned recovery handle;
//! - [`shutdown`]: OS termination signals.

mod actor;
mod builder;
mod config;
mod driver;
mod fingerprint;
mod handle;
mod launcher;
mod record;
mod registry;
mod shutdown;
mod state;
mod stats;

pub use builder::DriverBuilder;
pub use config::DriverConfig;
pub use driver::{Driver, ExecResult, PluginInfo};
pub use fingerprint::{Attribute, HealthSnapshot, HealthState, probe_binary};
pub use handle::{StopOutcome, TaskHandle};
pub use launcher::{LaunchSpec, ProcessHandle, StdioSink, decode_exit, launch};
pub use record::{DEFAULT_EXIT_CODE, ExitResult, TaskState, TaskStatus};
pub use registry::TaskStore;
pub use state::{DriverHandle, HANDLE_VERSION, PersistedState};
pub use stats::ResourceUsage;
