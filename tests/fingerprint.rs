mod common;

use std::time::Duration;

use procvisor::{Attribute, Driver, DriverConfig, HealthSnapshot, HealthState, RawExec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn next(rx: &mut mpsc::Receiver<HealthSnapshot>) -> HealthSnapshot {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("snapshot in time")
        .expect("stream open")
}

#[tokio::test]
async fn no_config_reports_waiting() {
    common::init_tracing();
    let driver = Driver::builder(RawExec).build();
    let mut rx = driver.fingerprint(CancellationToken::new());

    let snap = next(&mut rx).await;
    assert_eq!(snap.health, HealthState::Unhealthy);
    assert_eq!(snap.description, "waiting for config");
}

#[tokio::test]
async fn nonexistent_binary_is_undetected() {
    let dir = tempfile::tempdir().unwrap();
    let driver = common::driver();
    let blob = format!(
        r#"{{"runtime_path": "{}", "volumes_enabled": false}}"#,
        dir.path().join("no-runtime").display()
    );
    driver.set_config(blob.as_bytes()).unwrap();

    let snap = next(&mut driver.fingerprint(CancellationToken::new())).await;
    assert_eq!(snap.health, HealthState::Undetected);
    assert!(snap.attributes.is_empty());
}

#[tokio::test]
async fn executable_binary_is_healthy_with_version() {
    let driver = common::driver();
    driver
        .set_config(br#"{"runtime_path": "/bin/sh", "volumes_enabled": false}"#)
        .unwrap();

    let snap = next(&mut driver.fingerprint(CancellationToken::new())).await;
    assert_eq!(snap.health, HealthState::Healthy);
    assert_eq!(snap.description, "ready");
    assert_eq!(
        snap.attributes.get("driver.raw_exec"),
        Some(&Attribute::Bool(true))
    );
    assert!(matches!(
        snap.attributes.get("driver.raw_exec.version"),
        Some(Attribute::String(_))
    ));
}

#[tokio::test]
async fn volume_flag_toggles_only_its_attribute() {
    let driver = common::driver();
    driver
        .set_config(br#"{"runtime_path": "/bin/sh", "volumes_enabled": true}"#)
        .unwrap();
    let mut rx = driver.fingerprint(CancellationToken::new());

    let with_volumes = next(&mut rx).await;
    assert_eq!(
        with_volumes.attributes.get("driver.raw_exec.volumes.enabled"),
        Some(&Attribute::Bool(true))
    );

    // a config change triggers a probe without waiting for the period
    driver
        .set_config(br#"{"runtime_path": "/bin/sh", "volumes_enabled": false}"#)
        .unwrap();
    let without_volumes = next(&mut rx).await;

    assert_eq!(with_volumes.health, without_volumes.health);
    let mut expected = with_volumes.attributes.clone();
    expected.remove("driver.raw_exec.volumes.enabled");
    assert_eq!(without_volumes.attributes, expected);
}

#[tokio::test]
async fn disabled_driver_is_undetected() {
    common::init_tracing();
    let driver = Driver::builder(RawExec)
        .with_config(DriverConfig {
            enabled: false,
            ..DriverConfig::default()
        })
        .build();

    let snap = next(&mut driver.fingerprint(CancellationToken::new())).await;
    assert_eq!(snap.health, HealthState::Undetected);
    assert_eq!(snap.description, "disabled");
}

#[tokio::test]
async fn stream_closes_when_context_is_cancelled() {
    let driver = common::driver();
    let ctx = CancellationToken::new();
    let mut rx = driver.fingerprint(ctx.clone());
    next(&mut rx).await;

    ctx.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[test]
fn plugin_metadata() {
    let driver = Driver::builder(RawExec).build();
    let info = driver.plugin_info();
    assert_eq!(info.name, "raw_exec");
    assert_eq!(info.plugin_version, env!("CARGO_PKG_VERSION"));
    assert!(driver.capabilities().send_signals);
    assert!(driver.set_config(br#"{"bogus": 1}"#).is_err());
    assert!(driver.config().is_none());
}
