//! Latency probe (§4.F): per target, times a `GET`, records
//! `{code, total_seconds, error?}`, and reports the measured time to the
//! histogram even on failure.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use common::{LatencyResult, LatencyTargetResult, ResultDto, SimpleProbeConfig, StoredResult};
use prometheus::Registry;
use serde_json::json;
use tokio::sync::mpsc;

use crate::collectors::LatencyCollectors;
use crate::error::{ConfigError, EngineError, MetricError};
use crate::probe::{check_kind, removed_targets, validate_simple_config, Probe, ProbeBase, ProbeConfig};
use crate::retry::{with_retry, RetryOutcome};

pub struct LatencyProbe {
    base: ProbeBase<SimpleProbeConfig>,
    collectors: LatencyCollectors,
    client: reqwest::Client,
}

impl LatencyProbe {
    pub fn new(registry: &Registry, initial: SimpleProbeConfig) -> Result<Arc<Self>, MetricError> {
        Ok(Arc::new(Self {
            base: ProbeBase::new(initial),
            collectors: LatencyCollectors::register(registry)?,
            client: reqwest::Client::new(),
        }))
    }

    async fn check_one(
        &self,
        target: &str,
        cfg: &SimpleProbeConfig,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> LatencyTargetResult {
        let client = self.client.clone();
        let timeout = cfg.timeout;
        let target_owned = target.to_string();

        let start = Instant::now();
        let outcome = with_retry(cfg.retry, cancel, move |_ct| {
            let client = client.clone();
            let target = target_owned.clone();
            async move {
                let resp = client.get(&target).timeout(timeout).send().await.map_err(|e| e.to_string())?;
                let status = resp.status().as_u16();
                let _ = resp.bytes().await;
                Ok(status)
            }
        })
        .await;
        let total_seconds = start.elapsed().as_secs_f64();

        match outcome {
            RetryOutcome::Completed(Ok(code)) => LatencyTargetResult { code, total_seconds, error: None },
            RetryOutcome::Completed(Err(e)) => LatencyTargetResult { code: 0, total_seconds, error: Some(e) },
            RetryOutcome::Cancelled => {
                LatencyTargetResult { code: 0, total_seconds, error: Some("cancelled".to_string()) }
            }
        }
    }
}

#[async_trait]
impl Probe for LatencyProbe {
    fn name(&self) -> &'static str {
        "latency"
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
            let mut result: LatencyResult = LatencyResult::new();
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
        check_kind(common::ProbeKind::Latency, &cfg).map_err(|e| ConfigError::InvalidField {
            check_name: self.name().to_string(),
            field: "kind".to_string(),
            reason: e.to_string(),
        })?;
        let ProbeConfig::Latency(new) = cfg else { unreachable!() };
        validate_simple_config(self.name(), &new)?;

        let old = self.base.config().await;
        for target in removed_targets(&old.targets, &new.targets) {
            let _ = self.collectors.remove(target);
        }
        self.base.set_config(new).await;
        Ok(())
    }

    async fn get_config(&self) -> ProbeConfig {
        ProbeConfig::Latency(self.base.config().await)
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
                    "code": { "type": "integer" },
                    "total_seconds": { "type": "number" },
                    "error": { "type": "string", "nullable": true }
                },
                "required": ["code", "total_seconds"]
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
