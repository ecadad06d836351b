//! # Task request handed over by the orchestrator.
//!
//! The request carries identity, the per-task directory and stdio targets, the
//! environment, resource limits, and the runtime-specific driver config as an
//! opaque JSON value. The driver config is decoded into the runtime's typed
//! config at the boundary, before the task enters the supervision engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resource limits requested for a task.
///
/// Carried for the host only: they are persisted with the task and handed back on
/// recovery, but no runtime applies them. Enforcement (cgroups) belongs to the
/// orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Relative CPU weight.
    #[serde(default)]
    pub cpu_shares: u64,
    /// Memory limit in MiB.
    #[serde(default)]
    pub memory_mb: u64,
}

/// Launch parameters for one task, immutable once started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Caller-supplied unique task id.
    pub id: String,
    /// Human-readable task name.
    pub name: String,
    /// Private working directory of the task.
    pub task_dir: PathBuf,
    /// Environment passed to the workload (the driver's own environment is not inherited).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Stdout target; `None` discards output.
    #[serde(default)]
    pub stdout_path: Option<PathBuf>,
    /// Stderr target; `None` discards output.
    #[serde(default)]
    pub stderr_path: Option<PathBuf>,
    /// Resource limits, not enforced by the driver (see [`Resources`]).
    #[serde(default)]
    pub resources: Resources,
    /// Runtime-specific configuration, decoded by the driver.
    #[serde(default)]
    pub driver_config: serde_json::Value,
}

impl TaskRequest {
    /// Creates a request with empty environment, discarded stdio and no driver config.
    pub fn new(id: impl Into<String>, name: impl Into<String>, task_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_dir: task_dir.into(),
            env: BTreeMap::new(),
            stdout_path: None,
            stderr_path: None,
            resources: Resources::default(),
            driver_config: serde_json::Value::Null,
        }
    }

    /// Returns the request with the given driver config.
    pub fn with_driver_config(mut self, config: serde_json::Value) -> Self {
        self.driver_config = config;
        self
    }

    /// Returns the request with one more environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns the request with the given resource limits.
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Returns the request with stdout/stderr targets.
    pub fn with_stdio(mut self, stdout: Option<PathBuf>, stderr: Option<PathBuf>) -> Self {
        self.stdout_path = stdout;
        self.stderr_path = stderr;
        self
    }
}
