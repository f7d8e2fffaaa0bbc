//! Traceroute probe (§4.H): the parallel core. Per target, fans out one
//! worker per TTL bounded by a semaphore, and cancels everything still in
//! flight the moment any worker reaches the target.

pub mod icmp;
pub mod packet;
pub mod tcp;

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use common::{Hop, ResultDto, RuntimeConfig, StoredResult, TracerouteConfig, TracerouteProtocol, TracerouteResult};
use prometheus::Registry;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::collectors::TracerouteCollectors;
use crate::error::{ConfigError, EngineError, MetricError, ProbeError};
use crate::probe::{check_kind, validate_simple_config, Probe, ProbeBase, ProbeConfig};

pub struct TracerouteProbe {
    base: ProbeBase<TracerouteConfig>,
    collectors: TracerouteCollectors,
    icmp_available: bool,
}

impl TracerouteProbe {
    pub fn new(registry: &Registry, initial: TracerouteConfig, icmp_available: bool) -> Result<Arc<Self>, MetricError> {
        Ok(Arc::new(Self {
            base: ProbeBase::new(initial),
            collectors: TracerouteCollectors::register(registry)?,
            icmp_available,
        }))
    }

    fn effective_max_hops(cfg: &TracerouteConfig) -> u32 {
        if cfg.max_hops <= 0 {
            RuntimeConfig::DEFAULT_MAX_HOPS as u32
        } else {
            cfg.max_hops as u32
        }
    }

    fn effective_max_concurrent(cfg: &TracerouteConfig) -> u32 {
        if cfg.max_concurrent_hops == 0 {
            RuntimeConfig::DEFAULT_MAX_CONCURRENT_HOPS
        } else {
            cfg.max_concurrent_hops
        }
    }

    async fn resolve(addr: &str) -> Option<IpAddr> {
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return Some(ip);
        }
        tokio::net::lookup_host((addr, 0)).await.ok()?.next().map(|sa| sa.ip())
    }

    async fn trace_one(
        &self,
        addr: &str,
        port: u16,
        cfg: &TracerouteConfig,
        cancel: &CancellationToken,
    ) -> (String, TracerouteTargetResultParts) {
        let Some(ip) = Self::resolve(addr).await else {
            return (
                addr.to_string(),
                TracerouteTargetResultParts { hops: vec![], min_hops: None, error: Some("resolution failed".to_string()) },
            );
        };

        if cfg.protocol == TracerouteProtocol::Icmp && !self.icmp_available {
            return (
                addr.to_string(),
                TracerouteTargetResultParts {
                    hops: vec![],
                    min_hops: None,
                    error: Some("CAP_NET_RAW unavailable, ICMP traceroute disabled".to_string()),
                },
            );
        }
        if cfg.protocol == TracerouteProtocol::Udp {
            return (
                addr.to_string(),
                TracerouteTargetResultParts { hops: vec![], min_hops: None, error: Some("udp traceroute not supported".to_string()) },
            );
        }

        let max_hops = Self::effective_max_hops(cfg);
        let max_concurrent = Self::effective_max_concurrent(cfg);
        let tick_token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(max_concurrent as usize));
        let reached = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<Hop>();

        for ttl in 1..=max_hops {
            let semaphore = semaphore.clone();
            let tick_token = tick_token.clone();
            let reached = reached.clone();
            let tx = tx.clone();
            let timeout = cfg.timeout;
            let protocol = cfg.protocol;
            let sequence = ttl as u16;
            let identifier = rand::random::<u16>();

            tokio::spawn(async move {
                let permit = tokio::select! {
                    p = semaphore.acquire_owned() => p,
                    _ = tick_token.cancelled() => return,
                };
                let Ok(permit) = permit else { return };
                if tick_token.is_cancelled() {
                    drop(permit);
                    return;
                }

                let start = Instant::now();
                let outcome = match protocol {
                    TracerouteProtocol::Icmp => icmp::probe_hop(ip, ttl, identifier, sequence, timeout)
                        .await
                        .map(|o| (o.from, matches!(o.kind, packet::IcmpKind::EchoReply))),
                    TracerouteProtocol::Tcp => tcp::probe_hop(ip, port, ttl, identifier, sequence, timeout)
                        .await
                        .map(|o| (o.from, o.reached_target)),
                    TracerouteProtocol::Udp => Err(ProbeError::Other("udp traceroute not supported".to_string())),
                };
                let duration_seconds = start.elapsed().as_secs_f64();

                let hop = match outcome {
                    Ok((from, reached_target)) => {
                        if reached_target {
                            reached.store(true, Ordering::SeqCst);
                            tick_token.cancel();
                        }
                        Hop {
                            tracepoint: ttl,
                            ip: from.map(|a| a.to_string()),
                            error: None,
                            duration_seconds,
                            reached_target,
                        }
                    }
                    Err(e) => {
                        Hop { tracepoint: ttl, ip: None, error: Some(e.to_string()), duration_seconds, reached_target: false }
                    }
                };

                let _ = tx.send(hop);
                drop(permit);
            });
        }
        drop(tx);

        let mut hops = Vec::new();
        while let Some(hop) = rx.recv().await {
            hops.push(hop);
        }

        hops.sort_by_key(|h| h.tracepoint);
        let cutoff = hops.iter().position(|h| h.reached_target);
        if let Some(idx) = cutoff {
            hops.truncate(idx + 1);
        }
        let min_hops = cutoff.map(|idx| hops[idx].tracepoint);

        (addr.to_string(), TracerouteTargetResultParts { hops, min_hops, error: None })
    }
}

struct TracerouteTargetResultParts {
    hops: Vec<Hop>,
    min_hops: Option<u32>,
    error: Option<String>,
}

#[async_trait]
impl Probe for TracerouteProbe {
    fn name(&self) -> &'static str {
        "traceroute"
    }

    async fn run(&self, results_tx: mpsc::Sender<ResultDto>) -> Result<(), EngineError> {
        let token = self.base.shutdown_token();
        loop {
            let cfg = self.base.config().await;
            let mut interval = tokio::time::interval(cfg.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            tokio::select! {
                _ = interval.tick() => {}
                _ = token.cancelled() => return Ok(()),
            }
            if token.is_cancelled() {
                return Ok(());
            }

            let targets = common::dedupe_preserving_order(&cfg.targets);
            let handles: Vec<_> = targets
                .iter()
                .cloned()
                .map(|target| {
                    let token = token.clone();
                    async move { self.trace_one(&target.addr, target.port, &cfg, &token).await }
                })
                .collect();

            let outcomes = futures::future::join_all(handles).await;

            let mut result: TracerouteResult = TracerouteResult::new();
            for (key, parts) in outcomes {
                if let Some(min_hops) = parts.min_hops {
                    self.collectors.minimum_hops.with_label_values(&[&key]).set(min_hops as f64);
                }
                result.insert(
                    key,
                    common::TracerouteTargetResult { hops: parts.hops, min_hops: parts.min_hops, error: parts.error },
                );
            }

            let stored = StoredResult::new(json!(result), Utc::now());
            if results_tx.send(ResultDto { check_name: self.name().to_string(), result: stored }).await.is_err() {
                return Err(EngineError::ResultsChannelClosed);
            }
        }
    }

    async fn update_config(&self, cfg: ProbeConfig) -> Result<(), ConfigError> {
        check_kind(common::ProbeKind::Traceroute, &cfg).map_err(|e| ConfigError::InvalidField {
            check_name: self.name().to_string(),
            field: "kind".to_string(),
            reason: e.to_string(),
        })?;
        let ProbeConfig::Traceroute(new) = cfg else { unreachable!() };

        if new.targets.is_empty() {
            return Err(ConfigError::NoTargets { check_name: self.name().to_string() });
        }
        let fallback = common::SimpleProbeConfig {
            targets: new.targets.iter().map(|t| t.to_string()).collect(),
            interval: new.interval,
            timeout: new.timeout,
            retry: new.retry,
        };
        validate_simple_config(self.name(), &fallback)?;

        let old = self.base.config().await;
        let old_keys: Vec<String> = old.targets.iter().map(|t| t.addr.clone()).collect();
        let new_keys: Vec<String> = new.targets.iter().map(|t| t.addr.clone()).collect();
        for key in crate::probe::removed_targets(&old_keys, &new_keys) {
            let _ = self.collectors.remove(key);
        }
        self.base.set_config(new).await;
        Ok(())
    }

    async fn get_config(&self) -> ProbeConfig {
        ProbeConfig::Traceroute(self.base.config().await)
    }

    fn shutdown(&self) {
        self.base.shutdown();
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": {
                "type": "object",
                "properties": {
                    "hops": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tracepoint": { "type": "integer" },
                                "ip": { "type": "string", "nullable": true },
                                "error": { "type": "string", "nullable": true },
                                "duration_seconds": { "type": "number" },
                                "reached_target": { "type": "boolean" }
                            }
                        }
                    },
                    "min_hops": { "type": "integer", "nullable": true },
                    "error": { "type": "string", "nullable": true }
                }
            }
        })
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![Box::new(self.collectors.minimum_hops.clone())]
    }

    fn remove_labelled_metrics(&self, target: &str) -> Result<(), MetricError> {
        self.collectors.remove(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Hop;

    fn hop(ttl: u32, reached: bool) -> Hop {
        Hop { tracepoint: ttl, ip: Some("1.1.1.1".to_string()), error: None, duration_seconds: 0.01, reached_target: reached }
    }

    #[test]
    fn truncation_keeps_only_up_to_first_reached_hop() {
        let mut hops = vec![hop(3, true), hop(1, false), hop(2, false)];
        hops.sort_by_key(|h| h.tracepoint);
        let cutoff = hops.iter().position(|h| h.reached_target);
        if let Some(idx) = cutoff {
            hops.truncate(idx + 1);
        }
        assert_eq!(hops.len(), 3);
        assert!(hops.last().unwrap().reached_target);
    }

    #[test]
    fn effective_defaults_apply_for_non_positive_config() {
        let cfg = TracerouteConfig {
            targets: vec![],
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            retry: Default::default(),
            max_hops: 0,
            protocol: TracerouteProtocol::Tcp,
            max_concurrent_hops: 0,
        };
        assert_eq!(TracerouteProbe::effective_max_hops(&cfg), RuntimeConfig::DEFAULT_MAX_HOPS as u32);
        assert_eq!(TracerouteProbe::effective_max_concurrent(&cfg), RuntimeConfig::DEFAULT_MAX_CONCURRENT_HOPS);
    }
}
