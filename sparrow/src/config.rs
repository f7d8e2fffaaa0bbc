//! Process configuration (§10.3): the agent's own static configuration,
//! layered from an optional file plus environment overrides, independent of
//! the `RuntimeConfig` document the loaders emit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which runtime-config source to start, and where to find it. Exactly one
/// of `file`/`url` is meaningful depending on `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "default_loader_kind")]
    pub kind: LoaderKind,
    #[serde(default = "default_config_path")]
    pub file: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    File,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9090
}

fn default_loader_kind() -> LoaderKind {
    LoaderKind::File
}

fn default_config_path() -> String {
    "sparrow_runtime.yaml".to_string()
}

fn default_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    "sparrow".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            kind: default_loader_kind(),
            file: default_config_path(),
            url: None,
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), filter: None }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { namespace: default_namespace() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            loader: LoaderConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("sparrow").required(false))
            .add_source(config::Environment::with_prefix("SPARROW").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config file: {}. Using defaults.", e);
            Self::default()
        })
    }
}
