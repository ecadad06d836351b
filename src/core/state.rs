//! # Persisted task state.
//!
//! StartTask returns a [`DriverHandle`]; the orchestrator stores it opaquely and hands
//! it back to RecoverTask after a host restart. The handle wraps a JSON-encoded
//! [`PersistedState`] together with a format version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::runtime::TaskRequest;

/// Current handle format.
pub const HANDLE_VERSION: u32 = 1;

/// Opaque, versioned recovery handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverHandle {
    /// Format version of `driver_state`.
    pub version: u32,
    /// JSON-encoded [`PersistedState`].
    pub driver_state: Vec<u8>,
}

/// What is needed to reattach to a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Task id.
    pub task_id: String,
    /// Original launch request.
    pub request: TaskRequest,
    /// Workload process id.
    pub pid: u32,
    /// Kernel start time of the process; recovery refuses a live pid whose start time
    /// differs. Absent when procfs was unavailable at start.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Start time recorded when the process was spawned.
    pub started_at: DateTime<Utc>,
}

impl PersistedState {
    /// Encodes the state into a handle of the current version.
    pub fn encode(&self) -> Result<DriverHandle, DriverError> {
        let driver_state = serde_json::to_vec(self).map_err(|e| DriverError::state(e.to_string()))?;
        Ok(DriverHandle {
            version: HANDLE_VERSION,
            driver_state,
        })
    }
}

impl DriverHandle {
    /// Decodes the persisted state, rejecting unknown versions.
    pub fn decode(&self) -> Result<PersistedState, DriverError> {
        if self.version != HANDLE_VERSION {
            return Err(DriverError::state(format!(
                "unsupported handle version {} (expected {HANDLE_VERSION})",
                self.version
            )));
        }
        serde_json::from_slice(&self.driver_state).map_err(|e| DriverError::state(e.to_string()))
    }
}
