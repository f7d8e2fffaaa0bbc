//! Health probe (§4.E): one gauge per target, healthy iff the final retried
//! attempt returned HTTP 200.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{HealthResult, HealthStatus, ResultDto, SimpleProbeConfig, StoredResult};
use prometheus::Registry;
use serde_json::json;
use tokio::sync::mpsc;

use crate::collectors::HealthCollectors;
use crate::error::{ConfigError, EngineError, MetricError};
use crate::probe::{check_kind, removed_targets, validate_simple_config, Probe, ProbeBase, ProbeConfig};
use crate::retry::{with_retry, RetryOutcome};

pub struct HealthProbe {
    base: ProbeBase<SimpleProbeConfig>,
    collectors: HealthCollectors,
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new(registry: &Registry, initial: SimpleProbeConfig) -> Result<Arc<Self>, MetricError> {
        Ok(Arc::new(Self {
            base: ProbeBase::new(initial),
            collectors: HealthCollectors::register(registry)?,
            client: reqwest::Client::new(),
        }))
    }

    async fn check_one(&self, target: &str, cfg: &SimpleProbeConfig, cancel: &tokio_util::sync::CancellationToken) -> (HealthStatus, Option<String>) {
        let client = self.client.clone();
        let target = target.to_string();
        let timeout = cfg.timeout;

        let outcome = with_retry(cfg.retry, cancel, move |_ct| {
            let client = client.clone();
            let target = target.clone();
            async move {
                let resp = client
                    .get(&target)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if resp.status().as_u16() == 200 {
                    Ok(())
                } else {
                    Err(format!("unexpected status {}", resp.status()))
                }
            }
        })
        .await;

        match outcome {
            RetryOutcome::Completed(Ok(())) => (HealthStatus::Healthy, None),
            RetryOutcome::Completed(Err(e)) => (HealthStatus::Unhealthy, Some(e)),
            RetryOutcome::Cancelled => (HealthStatus::Unhealthy, Some("cancelled".to_string())),
        }
    }
}

#[async_trait]
impl Probe for HealthProbe {
    fn name(&self) -> &'static str {
        "health"
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
                        let (status, error) = self.check_one(&target, &cfg, &token).await;
                        self.collectors.up.with_label_values(&[&target]).set(if status == HealthStatus::Healthy { 1.0 } else { 0.0 });
                        if let Some(e) = &error {
                            tracing::debug!(%target, error = %e, "health check failed");
                        }
                        (target, status)
                    }
                })
                .collect();

            let outcomes = futures::future::join_all(handles).await;

            let mut result: HealthResult = HealthResult::new();
            for (target, status) in outcomes {
                result.insert(target, status);
            }

            let stored = StoredResult::new(json!(result), Utc::now());

            if results_tx.send(ResultDto { check_name: self.name().to_string(), result: stored }).await.is_err() {
                return Err(EngineError::ResultsChannelClosed);
            }
        }
    }

    async fn update_config(&self, cfg: ProbeConfig) -> Result<(), ConfigError> {
        check_kind(common::ProbeKind::Health, &cfg).map_err(|e| ConfigError::InvalidField {
            check_name: self.name().to_string(),
            field: "kind".to_string(),
            reason: e.to_string(),
        })?;
        let ProbeConfig::Health(new) = cfg else { unreachable!() };
        validate_simple_config(self.name(), &new)?;

        let old = self.base.config().await;
        for target in removed_targets(&old.targets, &new.targets) {
            let _ = self.collectors.remove(target);
        }
        self.base.set_config(new).await;
        Ok(())
    }

    async fn get_config(&self) -> ProbeConfig {
        ProbeConfig::Health(self.base.config().await)
    }

    fn shutdown(&self) {
        self.base.shutdown();
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": { "type": "string", "enum": ["healthy", "unhealthy"] }
        })
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![Box::new(self.collectors.up.clone())]
    }

    fn remove_labelled_metrics(&self, target: &str) -> Result<(), MetricError> {
        self.collectors.remove(target)
    }
}
