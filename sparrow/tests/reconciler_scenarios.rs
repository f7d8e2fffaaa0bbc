//! End-to-end reconciliation scenarios (mirrors the literal scenarios of
//! the spec's testable-properties section): add/remove diffing and
//! kind-mismatch rejection, driven against the reconciler's public API.

use std::time::Duration;

use common::{RuntimeConfig, SimpleProbeConfig};
use prometheus::Registry;
use sparrow::probe::health::HealthProbe;
use sparrow::probe::{Probe, ProbeConfig};
use sparrow::reconciler::Reconciler;
use sparrow::store::ResultStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A minimal hand-rolled responder that answers every connection with a
/// fixed 200 OK, no matter the request. Good enough for the health/latency
/// probes, which only care about the status line.
async fn spawn_ok_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            });
        }
    });

    format!("http://{addr}")
}

fn has_label(registry: &Registry, family_name: &str, label: &str, value: &str) -> bool {
    registry.gather().into_iter().any(|mf| {
        mf.name() == family_name
            && mf.get_metric().iter().any(|m| m.get_label().iter().any(|l| l.name() == label && l.value() == value))
    })
}

#[tokio::test]
async fn add_then_remove_target_drops_its_metric_row() {
    let base_url = spawn_ok_server().await;
    let t1 = format!("{base_url}/t1");
    let t2 = format!("{base_url}/t2");

    let registry = Registry::new();
    let store = ResultStore::new();
    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(registry.clone(), store.clone(), false, shutdown.clone());

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let drive_handle = tokio::spawn(reconciler.drive(rx));

    let health_cfg = SimpleProbeConfig {
        targets: vec![t1.clone(), t2.clone()],
        interval: Duration::from_millis(150),
        timeout: Duration::from_secs(1),
        retry: Default::default(),
    };
    let snapshot_one = RuntimeConfig { health: Some(health_cfg), ..Default::default() };
    tx.send(snapshot_one).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.get("health").await.is_some(), "expected a health result after the first tick");
    assert!(has_label(&registry, "sparrow_health_up", "target", &t1));
    assert!(has_label(&registry, "sparrow_health_up", "target", &t2));

    let health_cfg_two = SimpleProbeConfig {
        targets: vec![t2.clone()],
        interval: Duration::from_millis(150),
        timeout: Duration::from_secs(1),
        retry: Default::default(),
    };
    let snapshot_two = RuntimeConfig { health: Some(health_cfg_two), ..Default::default() };
    tx.send(snapshot_two).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!has_label(&registry, "sparrow_health_up", "target", &t1), "t1's row should be gone after removal");
    assert!(has_label(&registry, "sparrow_health_up", "target", &t2), "t2's row should still be present");

    shutdown.cancel();
    drop(tx);
    let _ = drive_handle.await;
}

#[tokio::test]
async fn removing_the_only_section_shuts_the_probe_down() {
    let base_url = spawn_ok_server().await;
    let target = format!("{base_url}/only");

    let registry = Registry::new();
    let store = ResultStore::new();
    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(registry.clone(), store.clone(), false, shutdown.clone());

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let drive_handle = tokio::spawn(reconciler.drive(rx));

    let cfg = SimpleProbeConfig {
        targets: vec![target.clone()],
        interval: Duration::from_millis(150),
        timeout: Duration::from_secs(1),
        retry: Default::default(),
    };
    tx.send(RuntimeConfig { health: Some(cfg), ..Default::default() }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(has_label(&registry, "sparrow_health_up", "target", &target));

    tx.send(RuntimeConfig::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!has_label(&registry, "sparrow_health_up", "target", &target));

    shutdown.cancel();
    drop(tx);
    let _ = drive_handle.await;
}

#[tokio::test]
async fn rejecting_an_invalid_initial_config_leaves_no_probe_live() {
    let registry = Registry::new();
    let store = ResultStore::new();
    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(registry.clone(), store.clone(), false, shutdown.clone());

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let drive_handle = tokio::spawn(reconciler.drive(rx));

    // No targets at all is rejected by `validate_simple_config` on every
    // probe kind; this must fail during creation too, not just on a later
    // reconfigure of an already-live probe.
    let invalid_cfg = SimpleProbeConfig {
        targets: vec![],
        interval: Duration::from_millis(150),
        timeout: Duration::from_secs(1),
        retry: Default::default(),
    };
    tx.send(RuntimeConfig { health: Some(invalid_cfg), ..Default::default() }).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store.get("health").await.is_none(), "no tick should ever have run for a rejected initial config");
    assert!(
        registry.gather().into_iter().filter(|mf| mf.name() == "sparrow_health_up").all(|mf| mf.get_metric().is_empty()),
        "a probe that was never created should never report a labelled metric row"
    );

    shutdown.cancel();
    drop(tx);
    let _ = drive_handle.await;
}

#[tokio::test]
async fn feeding_the_wrong_kind_leaves_the_probe_unchanged() {
    let registry = Registry::new();
    let initial = SimpleProbeConfig {
        targets: vec!["http://example.invalid".to_string()],
        interval: Duration::from_secs(1),
        timeout: Duration::from_secs(1),
        retry: Default::default(),
    };
    let probe = HealthProbe::new(&registry, initial.clone()).unwrap();

    let wrong_kind = ProbeConfig::Latency(initial.clone());
    let err = probe.update_config(wrong_kind).await.unwrap_err();
    assert!(err.to_string().contains("health"));
    assert!(err.to_string().contains("latency"));

    let ProbeConfig::Health(current) = probe.get_config().await else { panic!("wrong variant") };
    assert_eq!(current, initial);
}
