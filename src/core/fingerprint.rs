//! # Fingerprinting: periodic health of the wrapped runtime.
//!
//! [`HealthMonitor`] probes the runtime binary and produces [`HealthSnapshot`]s. The
//! loop probes immediately, then every `fingerprint_period_secs`, and also right
//! after the driver config changes.
//!
//! ## Classification
//! ```text
//! no config yet          → unhealthy  "waiting for config"
//! enabled = false        → undetected "disabled"
//! binary not found       → undetected
//! directory / no x bit   → unhealthy
//! other stat failure     → unhealthy
//! otherwise              → healthy    "ready"  (driver.<name>, driver.<name>.version)
//! ```
//! `driver.<name>.volumes.enabled` is added whenever volumes are enabled, whatever the health.
//!
//! ## Rules
//! - the sequence ends when the caller's context or the driver token is cancelled
//! - a dropped receiver stops the loop

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::DriverConfig;
use crate::core::launcher::resolve_binary;
use crate::runtime::Runtime;

/// Upper bound for the version probe.
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Version reported when the binary does not print one.
const UNKNOWN_VERSION: &str = "unknown";

/// Health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// The runtime is usable.
    Healthy,
    /// The runtime is present but misconfigured.
    Unhealthy,
    /// The runtime is absent or disabled; not an error.
    Undetected,
}

/// Fingerprint attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Attribute {
    /// Flag.
    Bool(bool),
    /// Text, e.g. a version.
    String(String),
    /// Number.
    Int(i64),
}

/// One fingerprint result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    /// Classification.
    pub health: HealthState,
    /// Human-readable description.
    pub description: String,
    /// Capability attributes keyed by name.
    pub attributes: HashMap<String, Attribute>,
}

impl HealthSnapshot {
    fn new(health: HealthState, description: impl Into<String>) -> Self {
        Self {
            health,
            description: description.into(),
            attributes: HashMap::new(),
        }
    }

    fn with_attribute(mut self, key: String, value: Attribute) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

/// Checks that `path` is an executable regular file.
///
/// On failure returns the health shade and a description.
pub fn probe_binary(path: &Path) -> Result<(), (HealthState, String)> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err((
            HealthState::Undetected,
            format!("runtime binary {} does not exist", path.display()),
        )),
        Err(e) => Err((
            HealthState::Unhealthy,
            format!("failed to stat runtime binary {}: {e}", path.display()),
        )),
        Ok(meta) if meta.is_dir() => Err((
            HealthState::Unhealthy,
            format!("runtime binary {} is a directory", path.display()),
        )),
        Ok(meta) if meta.permissions().mode() & 0o111 == 0 => Err((
            HealthState::Unhealthy,
            format!("runtime binary {} is not executable", path.display()),
        )),
        Ok(_) => Ok(()),
    }
}

/// Produces health snapshots for one runtime.
pub struct HealthMonitor {
    name: String,
    default_binary: String,
    version_argv: Vec<String>,
    config: watch::Receiver<Option<Arc<DriverConfig>>>,
}

impl HealthMonitor {
    pub(crate) fn new<R: Runtime>(
        runtime: &R,
        config: watch::Receiver<Option<Arc<DriverConfig>>>,
    ) -> Self {
        Self {
            name: runtime.name().to_string(),
            default_binary: runtime.default_binary().to_string(),
            version_argv: runtime.version_argv(),
            config,
        }
    }

    /// Probes once against the current config.
    pub async fn probe(&mut self) -> HealthSnapshot {
        let config = self.config.borrow_and_update().clone();
        let Some(config) = config else {
            return HealthSnapshot::new(HealthState::Unhealthy, "waiting for config");
        };
        if !config.enabled {
            return HealthSnapshot::new(HealthState::Undetected, "disabled");
        }

        let mut snapshot = self.probe_runtime(&config).await;
        if config.volumes_enabled {
            snapshot = snapshot.with_attribute(
                format!("driver.{}.volumes.enabled", self.name),
                Attribute::Bool(true),
            );
        }
        snapshot
    }

    async fn probe_runtime(&self, config: &DriverConfig) -> HealthSnapshot {
        self.probe_runtime_in(config, std::env::var_os("PATH").as_deref())
            .await
    }

    async fn probe_runtime_in(
        &self,
        config: &DriverConfig,
        search_path: Option<&OsStr>,
    ) -> HealthSnapshot {
        let binary = match resolve_binary(config.runtime_path.as_deref(), &self.default_binary) {
            Ok(path) => path,
            Err(e) => match locate(&self.default_binary, search_path) {
                Some(path) => path,
                None => return HealthSnapshot::new(HealthState::Undetected, e.to_string()),
            },
        };
        if let Err((health, description)) = probe_binary(&binary) {
            return HealthSnapshot::new(health, description);
        }

        let version = detect_version(&binary, &self.version_argv).await;
        HealthSnapshot::new(HealthState::Healthy, "ready")
            .with_attribute(format!("driver.{}", self.name), Attribute::Bool(true))
            .with_attribute(
                format!("driver.{}.version", self.name),
                Attribute::String(version),
            )
    }

    fn period(&self) -> Duration {
        self.config
            .borrow()
            .as_deref()
            .map(DriverConfig::fingerprint_period)
            .unwrap_or_else(|| DriverConfig::default().fingerprint_period())
    }

    /// Runs the probe loop until `ctx` or `shutdown` fires.
    pub(crate) fn spawn(
        mut self,
        ctx: CancellationToken,
        shutdown: CancellationToken,
    ) -> mpsc::Receiver<HealthSnapshot> {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                let snapshot = tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    s = self.probe() => s,
                };
                debug!(runtime = %self.name, health = ?snapshot.health, description = %snapshot.description, "fingerprint");

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    sent = tx.send(snapshot) => if sent.is_err() { break },
                }

                let period = self.period();
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                    changed = self.config.changed() => if changed.is_err() { break },
                }
            }
        });

        rx
    }
}

// `which` skips files without an execute bit. Finding them anyway lets a present
// but non-executable runtime classify as unhealthy rather than undetected.
fn locate(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }
    std::env::split_paths(search_path?)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

/// Runs the binary with `argv` and extracts a version string from its output.
async fn detect_version(binary: &Path, argv: &[String]) -> String {
    let output = Command::new(binary)
        .args(argv)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(VERSION_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => parse_version(&String::from_utf8_lossy(&out.stdout)),
        _ => UNKNOWN_VERSION.to_string(),
    }
}

/// Last word of the first non-empty line (`singularity version 3.5.2` → `3.5.2`).
fn parse_version(stdout: &str) -> String {
    stdout
        .lines()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().last())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_script(dir: &Path, body: &str, mode: u32) -> PathBuf {
        let path = dir.join("runtime");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn monitor(config: Option<DriverConfig>) -> (HealthMonitor, watch::Sender<Option<Arc<DriverConfig>>>) {
        let (tx, rx) = watch::channel(config.map(Arc::new));
        let m = HealthMonitor {
            name: "fake".into(),
            default_binary: "fake-runtime-not-on-path".into(),
            version_argv: vec!["--version".into()],
            config: rx,
        };
        (m, tx)
    }

    #[test]
    fn test_probe_binary_shades() {
        let dir = tempfile::tempdir().unwrap();

        let missing = probe_binary(&dir.path().join("nope")).unwrap_err();
        assert_eq!(missing.0, HealthState::Undetected);

        let is_dir = probe_binary(dir.path()).unwrap_err();
        assert_eq!(is_dir.0, HealthState::Unhealthy);

        let plain = write_script(dir.path(), "#!/bin/sh\n", 0o644);
        assert_eq!(probe_binary(&plain).unwrap_err().0, HealthState::Unhealthy);

        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(probe_binary(&plain).is_ok());
    }

    #[tokio::test]
    async fn test_non_executable_runtime_on_path_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _tx) = monitor(Some(DriverConfig::default()));
        let config = DriverConfig::default();

        let absent = m.probe_runtime_in(&config, Some(dir.path().as_os_str())).await;
        assert_eq!(absent.health, HealthState::Undetected);

        let bin = dir.path().join("fake-runtime-not-on-path");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o644)).unwrap();

        let snap = m.probe_runtime_in(&config, Some(dir.path().as_os_str())).await;
        assert_eq!(snap.health, HealthState::Unhealthy);
        assert!(snap.description.contains("not executable"));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("singularity version 3.5.2\n"), "3.5.2");
        assert_eq!(parse_version("\n3.0.3-1\n"), "3.0.3-1");
        assert_eq!(parse_version(""), UNKNOWN_VERSION);
    }

    #[tokio::test]
    async fn test_waiting_for_config_and_disabled() {
        let (mut m, tx) = monitor(None);
        let snap = m.probe().await;
        assert_eq!(snap.health, HealthState::Unhealthy);
        assert_eq!(snap.description, "waiting for config");

        tx.send_replace(Some(Arc::new(DriverConfig {
            enabled: false,
            ..DriverConfig::default()
        })));
        let snap = m.probe().await;
        assert_eq!(snap.health, HealthState::Undetected);
        assert_eq!(snap.description, "disabled");
        assert!(snap.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_healthy_binary_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "#!/bin/sh\necho 'fake version 1.2.3'\n", 0o755);
        let (mut m, _tx) = monitor(Some(DriverConfig {
            runtime_path: Some(bin),
            volumes_enabled: false,
            ..DriverConfig::default()
        }));

        let snap = m.probe().await;
        assert_eq!(snap.health, HealthState::Healthy);
        assert_eq!(snap.attributes.get("driver.fake"), Some(&Attribute::Bool(true)));
        assert_eq!(
            snap.attributes.get("driver.fake.version"),
            Some(&Attribute::String("1.2.3".into()))
        );
        assert!(!snap.attributes.contains_key("driver.fake.volumes.enabled"));
    }

    #[tokio::test]
    async fn test_volume_attribute_independent_of_health() {
        let dir = tempfile::tempdir().unwrap();
        let (mut m, _tx) = monitor(Some(DriverConfig {
            runtime_path: Some(dir.path().join("missing")),
            volumes_enabled: true,
            ..DriverConfig::default()
        }));

        let snap = m.probe().await;
        assert_eq!(snap.health, HealthState::Undetected);
        assert_eq!(
            snap.attributes.get("driver.fake.volumes.enabled"),
            Some(&Attribute::Bool(true))
        );
        assert_eq!(snap.attributes.len(), 1);
    }

    #[tokio::test]
    async fn test_loop_probes_immediately_and_closes_on_cancel() {
        let (m, _tx) = monitor(None);
        let ctx = CancellationToken::new();
        let mut rx = m.spawn(ctx.clone(), CancellationToken::new());

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("first probe is immediate")
            .expect("snapshot");
        assert_eq!(first.health, HealthState::Unhealthy);

        ctx.cancel();
        assert!(rx.recv().await.is_none());
    }
}
