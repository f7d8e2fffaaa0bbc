//! Per-probe tick payloads (§4.E–§4.H). Each of these is what ends up as the
//! `data` field of a `StoredResult`, keyed by target so the HTTP API and any
//! consumer of `/checks/{name}` see the exact shape each probe produces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// §4.E Health probe: healthy iff the final attempt returned HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

pub type HealthResult = BTreeMap<String, HealthStatus>;

/// §4.F Latency probe. `code == 0 <=> error.is_some()`; `total_seconds` is
/// never negative, and is recorded even on failure (the invariant the
/// histogram relies on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyTargetResult {
    pub code: u16,
    pub total_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

pub type LatencyResult = BTreeMap<String, LatencyTargetResult>;

/// §4.G DNS probe. An empty address set with no error is a valid outcome;
/// NXDOMAIN is modelled as `error`, not as an empty set with no error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsTargetResult {
    pub addresses: BTreeSet<String>,
    pub total_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

pub type DnsResult = BTreeMap<String, DnsTargetResult>;

/// §4.H one TTL step of a traceroute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub tracepoint: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub duration_seconds: f64,
    pub reached_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteTargetResult {
    pub hops: Vec<Hop>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_hops: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

pub type TracerouteResult = BTreeMap<String, TracerouteTargetResult>;
