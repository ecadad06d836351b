//! # Driver configuration.
//!
//! Provides [`DriverConfig`], the typed form of the plugin configuration blob the
//! host sends through `SetConfig`. The blob is JSON; unknown keys are rejected and
//! missing keys take the defaults below.
//!
//! ## Sentinel values
//! - `runtime_path = None` → the runtime's default binary, resolved through `PATH`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Global configuration for the driver.
///
/// ## Field semantics
/// - `enabled`: when false the driver fingerprints `undetected` ("disabled")
/// - `volumes_enabled`: allows bind mounts and adds the volumes attribute to fingerprints
/// - `runtime_path`: explicit runtime binary; `None` resolves the runtime's default name
/// - `fingerprint_period_secs`: delay between health probes
/// - `reattach_poll_ms`: liveness polling period for recovered processes
/// - `bus_capacity`: event bus ring buffer size
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Whether the driver accepts tasks at all.
    pub enabled: bool,

    /// Whether tasks may bind host paths.
    pub volumes_enabled: bool,

    /// Explicit path of the runtime binary.
    pub runtime_path: Option<PathBuf>,

    /// Seconds between fingerprint probes (the first probe fires immediately).
    pub fingerprint_period_secs: u64,

    /// Milliseconds between liveness checks of reattached processes.
    pub reattach_poll_ms: u64,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Event streams that lag behind more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,
}

impl DriverConfig {
    /// Decodes a plugin config blob. An empty blob yields the defaults.
    ///
    /// # Example
    /// ```
    /// use procvisor::DriverConfig;
    ///
    /// let cfg = DriverConfig::decode(br#"{"volumes_enabled": false}"#).unwrap();
    /// assert!(cfg.enabled);
    /// assert!(!cfg.volumes_enabled);
    /// ```
    pub fn decode(blob: &[u8]) -> Result<Self, DriverError> {
        if blob.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let cfg: Self =
            serde_json::from_slice(blob).map_err(|e| DriverError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the driver cannot run with.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.fingerprint_period_secs == 0 {
            return Err(DriverError::config("fingerprint_period_secs must be > 0"));
        }
        if self.reattach_poll_ms == 0 {
            return Err(DriverError::config("reattach_poll_ms must be > 0"));
        }
        if self.bus_capacity == 0 {
            return Err(DriverError::config("bus_capacity must be > 0"));
        }
        Ok(())
    }

    /// Returns the fingerprint period as a `Duration`.
    #[inline]
    pub fn fingerprint_period(&self) -> Duration {
        Duration::from_secs(self.fingerprint_period_secs)
    }

    /// Returns the reattach polling period as a `Duration`.
    #[inline]
    pub fn reattach_poll(&self) -> Duration {
        Duration::from_millis(self.reattach_poll_ms)
    }
}

impl Default for DriverConfig {
    /// Default configuration:
    ///
    /// - `enabled = true`
    /// - `volumes_enabled = true`
    /// - `runtime_path = None`
    /// - `fingerprint_period_secs = 30`
    /// - `reattach_poll_ms = 1000`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            enabled: true,
            volumes_enabled: true,
            runtime_path: None,
            fingerprint_period_secs: 30,
            reattach_poll_ms: 1000,
            bus_capacity: 1024,
        }
    }
}
