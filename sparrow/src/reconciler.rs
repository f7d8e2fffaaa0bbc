//! The check registry / reconciler (§4.I): owns the live probe set, diffs
//! incoming `RuntimeConfig` snapshots against it, and forwards per-tick
//! results into the result store.

use std::collections::HashMap;
use std::sync::Arc;

use common::{ProbeKind, ResultDto, RuntimeConfig};
use prometheus::Registry;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::probe::{sections, Probe, ProbeConfig};
use crate::probe::{dns::DnsProbe, health::HealthProbe, latency::LatencyProbe, traceroute::TracerouteProbe};
use crate::store::ResultStore;

struct LiveProbe {
    probe: Arc<dyn Probe>,
    run_handle: tokio::task::JoinHandle<()>,
}

pub struct Reconciler {
    registry: Registry,
    store: Arc<ResultStore>,
    icmp_available: bool,
    shutdown: CancellationToken,
    live: Mutex<HashMap<ProbeKind, LiveProbe>>,
}

impl Reconciler {
    pub fn new(registry: Registry, store: Arc<ResultStore>, icmp_available: bool, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self { registry, store, icmp_available, shutdown, live: Mutex::new(HashMap::new()) })
    }

    /// Consumes `runtime_rx` until it closes or shutdown fires, applying
    /// every snapshot it receives. Intended to be spawned as the
    /// reconciler's one multiplexing task (§5 "Scheduling model").
    pub async fn drive(self: Arc<Self>, mut runtime_rx: mpsc::Receiver<RuntimeConfig>) {
        let (results_tx, mut results_rx) = mpsc::channel::<ResultDto>(2);

        loop {
            tokio::select! {
                snapshot = runtime_rx.recv() => {
                    match snapshot {
                        Some(cfg) => self.apply(cfg, results_tx.clone()).await,
                        None => {
                            tracing::info!("runtime config channel closed, shutting down reconciler");
                            break;
                        }
                    }
                }
                Some(result) = results_rx.recv() => {
                    self.store.save(result.check_name, result.result).await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested, tearing down all probes");
                    break;
                }
            }
        }

        self.shutdown_all().await;

        // Drain any results already in flight before returning.
        drop(results_tx);
        while let Ok(result) = results_rx.try_recv() {
            self.store.save(result.check_name, result.result).await;
        }
    }

    async fn apply(&self, snapshot: RuntimeConfig, results_tx: mpsc::Sender<ResultDto>) {
        let mut live = self.live.lock().await;

        for (kind, new_cfg) in sections(&snapshot) {
            let exists = live.contains_key(&kind);

            match (new_cfg, exists) {
                (Some(cfg), false) => match self.create(kind, cfg, results_tx.clone()).await {
                    Ok(entry) => {
                        tracing::info!(%kind, "probe created");
                        live.insert(kind, entry);
                    }
                    Err(e) => tracing::warn!(%kind, error = %e, "failed to create probe"),
                },
                (Some(cfg), true) => {
                    let entry = live.get(&kind).expect("checked contains_key above");
                    if let Err(e) = entry.probe.update_config(cfg).await {
                        tracing::warn!(%kind, error = %e, "rejected config update, keeping current config");
                    }
                }
                (None, true) => {
                    if let Some(entry) = live.remove(&kind) {
                        tracing::info!(%kind, "probe removed from config, shutting down");
                        entry.probe.shutdown();
                        let _ = entry.run_handle.await;
                        for collector in entry.probe.collectors() {
                            self.registry.unregister(collector).ok();
                        }
                    }
                }
                (None, false) => {}
            }
        }
    }

    async fn create(
        &self,
        kind: ProbeKind,
        cfg: ProbeConfig,
        results_tx: mpsc::Sender<ResultDto>,
    ) -> Result<LiveProbe, Box<dyn std::error::Error + Send + Sync>> {
        let placeholder_simple = common::SimpleProbeConfig {
            targets: vec![],
            interval: std::time::Duration::from_secs(1),
            timeout: std::time::Duration::from_secs(1),
            retry: common::RetryConfig { count: 0, delay: std::time::Duration::from_secs(0) },
        };
        let placeholder_traceroute = common::TracerouteConfig {
            targets: vec![],
            interval: std::time::Duration::from_secs(1),
            timeout: std::time::Duration::from_secs(1),
            retry: common::RetryConfig { count: 0, delay: std::time::Duration::from_secs(0) },
            max_hops: 0,
            protocol: common::TracerouteProtocol::default(),
            max_concurrent_hops: 0,
        };

        // Constructed with a placeholder config first; `update_config` below
        // runs the same validation a later reconfigure would, so a snapshot
        // that's invalid on arrival never gets a probe registered or a `run`
        // task spawned for it (§4.I "UpdateConfig(new); if OK, register...").
        let probe: Arc<dyn Probe> = match kind {
            ProbeKind::Health => HealthProbe::new(&self.registry, placeholder_simple)?,
            ProbeKind::Latency => LatencyProbe::new(&self.registry, placeholder_simple)?,
            ProbeKind::Dns => DnsProbe::new(&self.registry, placeholder_simple)?,
            ProbeKind::Traceroute => TracerouteProbe::new(&self.registry, placeholder_traceroute, self.icmp_available)?,
        };

        probe.update_config(cfg).await?;

        let run_probe = probe.clone();
        let run_handle = tokio::spawn(async move {
            if let Err(e) = run_probe.run(results_tx).await {
                tracing::warn!(error = %e, "probe run loop exited with error");
            }
        });

        Ok(LiveProbe { probe, run_handle })
    }

    /// Structural schema for every probe currently live, keyed by kind, for
    /// the `/v1alpha1/openapi` document.
    pub async fn schemas(&self) -> HashMap<ProbeKind, serde_json::Value> {
        let live = self.live.lock().await;
        live.iter().map(|(kind, entry)| (*kind, entry.probe.schema())).collect()
    }

    async fn shutdown_all(&self) {
        let mut live = self.live.lock().await;
        for (kind, entry) in live.drain() {
            tracing::info!(%kind, "shutting down probe");
            entry.probe.shutdown();
            let _ = entry.run_handle.await;
            for collector in entry.probe.collectors() {
                self.registry.unregister(collector).ok();
            }
        }
    }
}
