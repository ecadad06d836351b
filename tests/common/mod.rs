#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procvisor::{Driver, DriverConfig, ExitResult, RawExec, TaskRequest};
use tokio_util::sync::CancellationToken;

/// Installs a test-friendly tracing subscriber once (`RUST_LOG` controls verbosity).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Raw exec driver with a fast reattach poll.
pub fn driver() -> Arc<Driver<RawExec>> {
    init_tracing();
    Driver::builder(RawExec)
        .with_config(DriverConfig {
            reattach_poll_ms: 20,
            ..DriverConfig::default()
        })
        .build()
}

/// A task running `sh -c <script>` in `dir`.
pub fn sh_task(id: &str, dir: &Path, script: &str) -> TaskRequest {
    TaskRequest::new(id, id, dir)
        .with_env("PATH", "/usr/bin:/bin")
        .with_driver_config(serde_json::json!({ "args": ["-c", script] }))
}

/// Waits (bounded) for the terminal result of `id`.
pub async fn wait_exit(driver: &Driver<RawExec>, id: &str) -> ExitResult {
    let mut rx = driver
        .wait_task(id, CancellationToken::new())
        .await
        .expect("task registered");
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("task exits in time")
        .expect("exit result delivered")
}
