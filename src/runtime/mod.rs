//! # Wrapped runtimes.
//!
//! The supervision engine is shared by every wrapped runtime; a runtime only
//! contributes a small capability set:
//! - [`Runtime`] - binary name, argv construction, capabilities, config validation
//! - [`Singularity`] - Singularity container runtime (`singularity run|exec ... <image>`)
//! - [`RawExec`] - runs the configured binary with task-supplied arguments
//! - [`TaskRequest`] - what the orchestrator hands over for one task

mod raw_exec;
mod request;
mod singularity;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::DriverConfig;

pub use raw_exec::{RawExec, RawExecConfig};
pub use request::{Resources, TaskRequest};
pub use singularity::{Singularity, SingularityConfig};

/// How the runtime isolates the task filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsIsolation {
    /// Task sees the host filesystem.
    None,
    /// Task runs in a chroot-like root.
    Chroot,
    /// Task runs in its own image.
    Image,
}

/// Optional features a runtime supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `SignalTask` and graceful stop signals are allowed.
    pub send_signals: bool,
    /// `ExecTask` is allowed.
    pub exec: bool,
    /// Filesystem isolation mode.
    pub fs_isolation: FsIsolation,
}

/// # Capability set of one wrapped runtime.
///
/// The driver decodes the task's opaque driver config into [`Runtime::Config`],
/// validates it, then launches [`Runtime::default_binary`] (or the configured
/// override) with the argv returned by [`Runtime::build_argv`].
///
/// # Example
/// ```
/// use procvisor::{Capabilities, DriverConfig, FsIsolation, Runtime};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct EchoConfig { text: String }
///
/// struct Echo;
///
/// impl Runtime for Echo {
///     type Config = EchoConfig;
///     fn name(&self) -> &str { "echo" }
///     fn default_binary(&self) -> &str { "echo" }
///     fn capabilities(&self) -> Capabilities {
///         Capabilities { send_signals: true, exec: false, fs_isolation: FsIsolation::None }
///     }
///     fn build_argv(&self, config: &EchoConfig) -> Vec<String> { vec![config.text.clone()] }
/// }
///
/// assert_eq!(Echo.build_argv(&EchoConfig { text: "hi".into() }), vec!["hi"]);
/// ```
pub trait Runtime: Send + Sync + 'static {
    /// Typed per-task driver configuration.
    type Config: DeserializeOwned + Serialize + Clone + fmt::Debug + Send + Sync + 'static;

    /// Stable runtime name, also used as the attribute prefix (`driver.<name>`).
    fn name(&self) -> &str;

    /// Binary looked up through `PATH` when no `runtime_path` is configured.
    fn default_binary(&self) -> &str;

    /// Optional features this runtime supports.
    fn capabilities(&self) -> Capabilities;

    /// Arguments passed to the runtime binary (without `argv[0]`).
    fn build_argv(&self, config: &Self::Config) -> Vec<String>;

    /// Checks a decoded task config against the driver configuration.
    fn validate(&self, _config: &Self::Config, _driver: &DriverConfig) -> Result<(), String> {
        Ok(())
    }

    /// Arguments that run `cmd` inside the task's workload, when exec is supported.
    fn exec_argv(&self, _config: &Self::Config, _cmd: &[String]) -> Option<Vec<String>> {
        None
    }

    /// Arguments that make the binary print its version.
    fn version_argv(&self) -> Vec<String> {
        vec!["--version".to_string()]
    }
}
