//! # Raw exec runtime.
//!
//! Runs the configured runtime binary (default `/bin/sh`) with the task's
//! arguments and no isolation. Useful for plain host workloads and for
//! exercising the supervision engine without a container runtime installed.

use serde::{Deserialize, Serialize};

use crate::runtime::{Capabilities, FsIsolation, Runtime};

/// Driver config of one raw exec task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawExecConfig {
    /// Arguments passed to the runtime binary.
    pub args: Vec<String>,
}

/// Raw exec runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawExec;

impl Runtime for RawExec {
    type Config = RawExecConfig;

    fn name(&self) -> &str {
        "raw_exec"
    }

    fn default_binary(&self) -> &str {
        "/bin/sh"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            send_signals: true,
            exec: false,
            fs_isolation: FsIsolation::None,
        }
    }

    fn build_argv(&self, config: &RawExecConfig) -> Vec<String> {
        config.args.clone()
    }

    // `sh` has no version flag; `-c true` still proves the binary runs.
    fn version_argv(&self) -> Vec<String> {
        vec!["-c".to_string(), "true".to_string()]
    }
}
