//! Error types for the check engine, its probes and its configuration
//! loaders. Each stage of the pipeline gets its own enum rather than one
//! catch-all, mirroring how the teacher keeps `AuthError`/`Iperf3Error`
//! scoped to the subsystem that raises them.

use thiserror::Error;

/// Raised while validating or applying a `RuntimeConfig` section against a
/// probe that is already running.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("check '{check_name}': field '{field}' invalid: {reason}")]
    InvalidField {
        check_name: String,
        field: String,
        reason: String,
    },

    #[error("check '{check_name}' has no targets configured")]
    NoTargets { check_name: String },

    #[error("failed to decode runtime config: {0}")]
    Decode(String),

    #[error("failed to load runtime config: {0}")]
    Load(String),
}

/// Raised when a config update targets the wrong probe implementation, or
/// a kind the registry does not recognize.
#[derive(Error, Debug)]
pub enum KindMismatchError {
    #[error("expected config for probe kind '{expected}', got '{current}'")]
    Mismatch { expected: String, current: String },

    #[error("unknown probe kind '{0}'")]
    Unknown(String),
}

/// Raised by a probe's single-target check function. Never fatal to the
/// probe's run loop: callers record it into the tick's result instead of
/// propagating it.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("dns resolution failed: {0}")]
    Resolution(String),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Raised by the engine/reconciler itself: registry bookkeeping, channel
/// plumbing, shutdown coordination.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    KindMismatch(#[from] KindMismatchError),

    #[error("results channel closed")]
    ResultsChannelClosed,

    #[error("config channel closed")]
    ConfigChannelClosed,
}

/// Raised when registering or removing Prometheus collectors.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("failed to register collector '{0}': {1}")]
    Register(String, #[source] prometheus::Error),

    #[error("metric not found for label set {0:?}")]
    NotFound(Vec<String>),

    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
}
