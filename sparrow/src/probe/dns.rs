//! DNS probe (§4.G): resolves A/AAAA (and PTR for literal IP targets),
//! recording the address set and lookup latency per target. An empty
//! address set with no error is a valid outcome; NXDOMAIN is an error.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use common::{DnsResult, DnsTargetResult, ResultDto, SimpleProbeConfig, StoredResult};
use prometheus::Registry;
use serde_json::json;
use tokio::sync::mpsc;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::collectors::DnsCollectors;
use crate::error::{ConfigError, EngineError, MetricError};
use crate::probe::{check_kind, removed_targets, validate_simple_config, Probe, ProbeBase, ProbeConfig};
use crate::retry::{with_retry, RetryOutcome};

pub struct DnsProbe {
    base: ProbeBase<SimpleProbeConfig>,
    collectors: DnsCollectors,
    resolver: TokioAsyncResolver,
}

impl DnsProbe {
    pub fn new(registry: &Registry, initial: SimpleProbeConfig) -> Result<Arc<Self>, MetricError> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Ok(Arc::new(Self { base: ProbeBase::new(initial), collectors: DnsCollectors::register(registry)?, resolver }))
    }

    async fn resolve_once(&self, target: &str) -> Result<std::collections::BTreeSet<String>, String> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            let reverse = self.resolver.reverse_lookup(ip).await.map_err(|e| e.to_string())?;
            return Ok(reverse.into_iter().map(|name| name.to_string()).collect());
        }

        let lookup = self.resolver.lookup_ip(target).await.map_err(|e| e.to_string())?;
        Ok(lookup.into_iter().map(|ip| ip.to_string()).collect())
    }

    async fn check_one(
        &self,
        target: &str,
        cfg: &SimpleProbeConfig,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> DnsTargetResult {
        let start = Instant::now();
        let outcome = with_retry(cfg.retry, cancel, |_ct| self.resolve_once(target)).await;
        let total_seconds = start.elapsed().as_secs_f64();

        match outcome {
            RetryOutcome::Completed(Ok(addresses)) => DnsTargetResult { addresses, total_seconds, error: None },
            RetryOutcome::Completed(Err(e)) => {
                DnsTargetResult { addresses: Default::default(), total_seconds, error: Some(e) }
            }
            RetryOutcome::Cancelled => {
                DnsTargetResult { addresses: Default::default(), total_seconds, error: Some("cancelled".to_string()) }
            }
        }
    }
}

#[async_trait]
impl Probe for DnsProbe {
    fn name(&self) -> &'static str {
        "dns"
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
                    async move {
                        let outcome = self.check_one(&target, &cfg, &token).await;
                        self.collectors.seconds.with_label_values(&[&target]).set(outcome.total_seconds);
                        self.collectors.count.with_label_values(&[&target]).inc();
                        self.collectors.duration.with_label_values(&[&target]).observe(outcome.total_seconds);
                        (target, outcome)
                    }
                })
                .collect();

            let outcomes = futures::future::join_all(handles).await;
            let mut result: DnsResult = DnsResult::new();
            for (target, outcome) in outcomes {
                result.insert(target, outcome);
            }

            let stored = StoredResult::new(json!(result), Utc::now());
            if results_tx.send(ResultDto { check_name: self.name().to_string(), result: stored }).await.is_err() {
                return Err(EngineError::ResultsChannelClosed);
            }
        }
    }

    async fn update_config(&self, cfg: ProbeConfig) -> Result<(), ConfigError> {
        check_kind(common::ProbeKind::Dns, &cfg).map_err(|e| ConfigError::InvalidField {
            check_name: self.name().to_string(),
            field: "kind".to_string(),
            reason: e.to_string(),
        })?;
        let ProbeConfig::Dns(new) = cfg else { unreachable!() };
        validate_simple_config(self.name(), &new)?;

        let old = self.base.config().await;
        for target in removed_targets(&old.targets, &new.targets) {
            let _ = self.collectors.remove(target);
        }
        self.base.set_config(new).await;
        Ok(())
    }

    async fn get_config(&self) -> ProbeConfig {
        ProbeConfig::Dns(self.base.config().await)
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
                    "addresses": { "type": "array", "items": { "type": "string" } },
                    "total_seconds": { "type": "number" },
                    "error": { "type": "string", "nullable": true }
                },
                "required": ["addresses", "total_seconds"]
            }
        })
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![
            Box::new(self.collectors.seconds.clone()),
            Box::new(self.collectors.count.clone()),
            Box::new(self.collectors.duration.clone()),
        ]
    }

    fn remove_labelled_metrics(&self, target: &str) -> Result<(), MetricError> {
        self.collectors.remove(target)
    }
}
