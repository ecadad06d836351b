//! # Example: run_task
//!
//! Starts one shell workload through the raw exec runtime, watches its events,
//! stops it with a grace period and shuts the driver down.
//!
//! Demonstrates how to:
//! - Build a [`Driver`] with the [`LogWriter`] subscriber.
//! - Read the first fingerprint.
//! - Start, inspect, stop and destroy a task.
//!
//! ## Flow
//! ```text
//! Driver::builder(RawExec) ──► build()
//!     ├─► fingerprint()          → healthy "ready"
//!     ├─► start_task(request)    → TaskStarted
//!     ├─► inspect_task()         → Running, pid
//!     ├─► stop_task(2s, SIGTERM) → SignalSent → TaskExited
//!     ├─► destroy_task()         → TaskDestroyed
//!     └─► shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example run_task
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use procvisor::{Driver, DriverConfig, LogWriter, RawExec, Subscribe, TaskRequest};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let driver = Driver::builder(RawExec)
        .with_config(DriverConfig::default())
        .with_subscribers(subs)
        .build();

    let mut health = driver.fingerprint(CancellationToken::new());
    if let Some(snapshot) = health.recv().await {
        println!("fingerprint: {:?} ({})", snapshot.health, snapshot.description);
    }

    let task_dir = tempfile::tempdir()?;
    let request = TaskRequest::new("demo-1", "ticker", task_dir.path())
        .with_env("PATH", "/usr/bin:/bin")
        .with_driver_config(serde_json::json!({
            "args": ["-c", "trap 'echo bye; exit 0' TERM; while :; do echo tick; sleep 0.2; done"],
        }))
        .with_stdio(Some(task_dir.path().join("stdout.log")), None);

    let handle = driver.start_task(request).await?;
    println!("persisted handle: {} bytes (version {})", handle.driver_state.len(), handle.version);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let status = driver.inspect_task("demo-1").await?;
    println!("status: {:?} pid={:?}", status.state, status.pid());

    driver
        .stop_task("demo-1", Duration::from_secs(2), Some("SIGTERM"))
        .await?;
    let status = driver.inspect_task("demo-1").await?;
    println!("after stop: {:?} {:?}", status.state, status.exit_result);

    let output = std::fs::read_to_string(task_dir.path().join("stdout.log"))?;
    println!("task wrote {} lines", output.lines().count());

    driver.destroy_task("demo-1", false).await?;
    driver.shutdown().await;
    Ok(())
}
