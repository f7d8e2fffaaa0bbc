//! The probe contract (§4.D) and the small composition base every probe
//! embeds instead of inheriting from. Concrete probes live in sibling
//! modules: [`health`], [`latency`], [`dns`], [`traceroute`].

pub mod dns;
pub mod health;
pub mod latency;
pub mod traceroute;

use async_trait::async_trait;
use common::{ProbeKind, RuntimeConfig, SimpleProbeConfig, TracerouteConfig};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, EngineError, KindMismatchError, MetricError};

/// The config payload a single `UpdateConfig` call carries. One variant per
/// probe kind; `kind()` is how the reconciler checks it matches the probe
/// it's calling into before ever touching the probe's state.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeConfig {
    Health(SimpleProbeConfig),
    Latency(SimpleProbeConfig),
    Dns(SimpleProbeConfig),
    Traceroute(TracerouteConfig),
}

impl ProbeConfig {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeConfig::Health(_) => ProbeKind::Health,
            ProbeConfig::Latency(_) => ProbeKind::Latency,
            ProbeConfig::Dns(_) => ProbeKind::Dns,
            ProbeConfig::Traceroute(_) => ProbeKind::Traceroute,
        }
    }
}

/// Pulls the four optional sections of a [`RuntimeConfig`] snapshot out as a
/// uniform `(kind, Option<ProbeConfig>)` list, so the reconciler can diff
/// without matching on the concrete struct shape.
pub fn sections(cfg: &RuntimeConfig) -> [(ProbeKind, Option<ProbeConfig>); 4] {
    [
        (ProbeKind::Health, cfg.health.clone().map(ProbeConfig::Health)),
        (ProbeKind::Latency, cfg.latency.clone().map(ProbeConfig::Latency)),
        (ProbeKind::Dns, cfg.dns.clone().map(ProbeConfig::Dns)),
        (ProbeKind::Traceroute, cfg.traceroute.clone().map(ProbeConfig::Traceroute)),
    ]
}

/// Every probe satisfies this capability set (§4.D). `Arc<dyn Probe>` is how
/// the reconciler holds a polymorphic, dynamically typed set of checks.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Blocks until shut down; emits one result onto `results_tx` per
    /// completed tick.
    async fn run(&self, results_tx: mpsc::Sender<common::ResultDto>) -> Result<(), EngineError>;

    /// Validates then atomically swaps configuration. Stale target rows are
    /// removed from this probe's collectors before returning.
    async fn update_config(&self, cfg: ProbeConfig) -> Result<(), ConfigError>;

    async fn get_config(&self) -> ProbeConfig;

    /// Idempotent cooperative stop.
    fn shutdown(&self);

    /// Structural description of this probe's result payload, for the
    /// OpenAPI document assembled by the HTTP API.
    fn schema(&self) -> Value;

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>>;

    fn remove_labelled_metrics(&self, target: &str) -> Result<(), MetricError>;
}

/// Shared state every probe composes rather than inherits: a lock around its
/// own config and a shutdown signal. The tick loop copies the config under
/// the lock and releases it before issuing I/O (§5 "Shared resources").
pub struct ProbeBase<C> {
    config: RwLock<C>,
    shutdown_token: CancellationToken,
}

impl<C: Clone> ProbeBase<C> {
    pub fn new(initial: C) -> Self {
        Self { config: RwLock::new(initial), shutdown_token: CancellationToken::new() }
    }

    pub async fn config(&self) -> C {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, new: C) {
        *self.config.write().await = new;
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

/// Targets present in `old` but not `new`, by the deep-equality rule of §3
/// (duplicates collapse to one logical target, order irrelevant for diffing).
pub fn removed_targets<'a>(old: &'a [String], new: &'a [String]) -> Vec<&'a str> {
    old.iter().map(String::as_str).filter(|t| !new.iter().any(|n| n == t)).collect()
}

/// Validates the kind of an incoming config against the probe receiving it,
/// per §4.D / §7's `{expected, current}` shape.
pub fn check_kind(expected: ProbeKind, cfg: &ProbeConfig) -> Result<(), KindMismatchError> {
    if cfg.kind() == expected {
        Ok(())
    } else {
        Err(KindMismatchError::Mismatch { expected: expected.to_string(), current: cfg.kind().to_string() })
    }
}

/// Common target-list validation shared by health/latency/dns (§4.D: a
/// config with no targets is rejected at `UpdateConfig`, never silently
/// accepted as a no-op probe).
pub fn validate_simple_config(check_name: &str, cfg: &SimpleProbeConfig) -> Result<(), ConfigError> {
    if cfg.targets.is_empty() {
        return Err(ConfigError::NoTargets { check_name: check_name.to_string() });
    }
    if cfg.interval < std::time::Duration::from_millis(100) {
        return Err(ConfigError::InvalidField {
            check_name: check_name.to_string(),
            field: "interval".to_string(),
            reason: "must be at least 100ms".to_string(),
        });
    }
    if cfg.timeout < std::time::Duration::from_secs(1) {
        return Err(ConfigError::InvalidField {
            check_name: check_name.to_string(),
            field: "timeout".to_string(),
            reason: "must be at least 1s".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_targets_computes_set_difference() {
        let old = vec!["a".to_string(), "b".to_string()];
        let new = vec!["b".to_string(), "c".to_string()];
        assert_eq!(removed_targets(&old, &new), vec!["a"]);
    }

    #[test]
    fn check_kind_rejects_mismatch() {
        let cfg = ProbeConfig::Latency(SimpleProbeConfig {
            targets: vec!["t".into()],
            interval: std::time::Duration::from_secs(1),
            timeout: std::time::Duration::from_secs(1),
            retry: Default::default(),
        });
        let err = check_kind(ProbeKind::Health, &cfg).unwrap_err();
        match err {
            KindMismatchError::Mismatch { expected, current } => {
                assert_eq!(expected, "health");
                assert_eq!(current, "latency");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn validate_rejects_empty_targets() {
        let cfg = SimpleProbeConfig {
            targets: vec![],
            interval: std::time::Duration::from_secs(1),
            timeout: std::time::Duration::from_secs(1),
            retry: Default::default(),
        };
        assert!(validate_simple_config("health", &cfg).is_err());
    }
}
