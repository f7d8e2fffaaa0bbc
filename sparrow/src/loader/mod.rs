//! Configuration loaders (§10.5): any component that decodes bytes into a
//! [`RuntimeConfig`] and pushes changed snapshots onto the reconciler's
//! channel satisfies [`Loader`]. File and HTTP implementations are provided
//! in full since a deployable agent needs at least one out of the box.

pub mod file;
pub mod http;

use async_trait::async_trait;
use common::RuntimeConfig;

use crate::error::ConfigError;

#[async_trait]
pub trait Loader: Send + Sync {
    /// Runs until `shutdown` is called or a fatal error occurs, pushing
    /// every runtime config snapshot that differs from the last one pushed.
    async fn run(&self, tx: tokio::sync::mpsc::Sender<RuntimeConfig>) -> Result<(), ConfigError>;

    fn shutdown(&self);
}

/// One decoder shared by both loaders (§9 "Dynamic configuration"): YAML is
/// a superset of JSON, so this single `serde_yaml` pass handles either wire
/// format without the caller needing to guess which one it received.
pub fn decode_runtime_config(bytes: &[u8]) -> Result<RuntimeConfig, ConfigError> {
    serde_yaml::from_slice(bytes).map_err(|e| ConfigError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_json_bytes_too() {
        let json = br#"{"health": {"targets": ["https://example.com"], "interval": "30s", "timeout": "5s"}}"#;
        let cfg = decode_runtime_config(json).unwrap();
        assert!(cfg.health.is_some());
    }

    #[test]
    fn decode_error_is_wrapped() {
        let bad = b"- just\n- a\n- list\n";
        assert!(decode_runtime_config(bad).is_err());
    }
}
