//! The runtime configuration document (§6): a YAML or JSON snapshot with one
//! optional section per probe kind. Absent = the probe must not run; present
//! = the probe must run with the supplied configuration. Shared between the
//! loaders (which decode bytes into this type) and the engine (which diffs
//! successive snapshots).

use crate::target::TracerouteTarget;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `{count, delay}` retry policy, common to every probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub count: u32,
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { count: 0, delay: Duration::from_secs(0) }
    }
}

/// Stable probe identifier. A probe's name always equals its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Health,
    Latency,
    Dns,
    Traceroute,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] =
        [ProbeKind::Health, ProbeKind::Latency, ProbeKind::Dns, ProbeKind::Traceroute];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Health => "health",
            ProbeKind::Latency => "latency",
            ProbeKind::Dns => "dns",
            ProbeKind::Traceroute => "traceroute",
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traceroute protocol selection. UDP is reserved: the spec preserves the
/// slot but leaves it unimplemented (§4.H, §9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracerouteProtocol {
    Icmp,
    Tcp,
    Udp,
}

impl Default for TracerouteProtocol {
    fn default() -> Self {
        TracerouteProtocol::Icmp
    }
}

/// Shape shared by health, latency and dns configs: a target list plus
/// interval/timeout/retry. Traceroute repeats these fields rather than
/// embedding this struct because its target type differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleProbeConfig {
    pub targets: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteConfig {
    pub targets: Vec<TracerouteTarget>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub retry: RetryConfig,
    /// `<= 0` is normalized to 30 by the probe's validator, not here —
    /// serde `default` only fires when the field is absent, not when it is
    /// an explicit non-positive value (DESIGN.md).
    #[serde(default)]
    pub max_hops: i32,
    #[serde(default)]
    pub protocol: TracerouteProtocol,
    #[serde(default)]
    pub max_concurrent_hops: u32,
}

/// The aggregate snapshot a loader pushes onto the reconciler's channel.
/// Unknown top-level fields are ignored by serde's default behaviour
/// (no `deny_unknown_fields`), matching §6.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub health: Option<SimpleProbeConfig>,
    #[serde(default)]
    pub latency: Option<SimpleProbeConfig>,
    #[serde(default)]
    pub dns: Option<SimpleProbeConfig>,
    #[serde(default)]
    pub traceroute: Option<TracerouteConfig>,
}

impl RuntimeConfig {
    /// Normalized default for `maxHops`: negative or zero becomes 30.
    pub const DEFAULT_MAX_HOPS: i32 = 30;
    /// Normalized default for `maxConcurrentHops`.
    pub const DEFAULT_MAX_CONCURRENT_HOPS: u32 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_yaml_with_human_durations() {
        let yaml = r#"
health:
  targets: ["https://example.com"]
  interval: 30s
  timeout: 5s
  retry:
    count: 2
    delay: 1s
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        let health = cfg.health.unwrap();
        assert_eq!(health.targets, vec!["https://example.com"]);
        assert_eq!(health.interval, Duration::from_secs(30));
        assert_eq!(health.retry.count, 2);
        assert_eq!(health.retry.delay, Duration::from_secs(1));
        assert!(cfg.latency.is_none());
    }

    #[test]
    fn missing_sections_mean_disabled() {
        let cfg: RuntimeConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.health.is_none());
        assert!(cfg.latency.is_none());
        assert!(cfg.dns.is_none());
        assert!(cfg.traceroute.is_none());
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let yaml = r#"
some_future_probe:
  targets: []
health:
  targets: ["a"]
  interval: 1s
  timeout: 1s
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.health.is_some());
    }

    #[test]
    fn equality_is_structural_per_field() {
        let a: RuntimeConfig = serde_yaml::from_str(
            "health:\n  targets: [\"a\"]\n  interval: 1s\n  timeout: 1s\n",
        )
        .unwrap();
        let b = a.clone();
        assert_eq!(a, b);
        let mut c = b.clone();
        c.health.as_mut().unwrap().targets.push("b".into());
        assert_ne!(a, c);
    }

    #[test]
    fn traceroute_decodes_structured_targets() {
        let yaml = r#"
traceroute:
  targets:
    - { addr: "10.0.0.1", port: 80 }
  interval: 1m
  timeout: 2s
  maxHops: 10
  protocol: tcp
  maxConcurrentHops: 5
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        let tr = cfg.traceroute.unwrap();
        assert_eq!(tr.targets[0].addr, "10.0.0.1");
        assert_eq!(tr.targets[0].port, 80);
        assert_eq!(tr.max_hops, 10);
        assert_eq!(tr.protocol, TracerouteProtocol::Tcp);
        assert_eq!(tr.max_concurrent_hops, 5);
    }
}
