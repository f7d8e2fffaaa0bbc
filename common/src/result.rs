//! The result store envelope (§4.B, §6): `Result{data, timestamp, error?}`
//! as served by `GET /checks/{name}`, and the `ResultDto` envelope a probe
//! places on its channel to the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed tick's outcome for a single probe, ready to be stored and
/// served. `data` holds the probe-specific payload (see `payload.rs`)
/// encoded as JSON so the store and the HTTP API never need to know the
/// concrete per-probe type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl StoredResult {
    pub fn new(data: Value, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp, error: None }
    }

    pub fn with_error(data: Value, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self { data, timestamp, error: Some(error.into()) }
    }
}

/// Envelope placed on the probe → reconciler results channel.
#[derive(Debug, Clone)]
pub struct ResultDto {
    pub check_name: String,
    pub result: StoredResult,
}
