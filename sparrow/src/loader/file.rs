//! File-based loader: rereads a YAML/JSON runtime config file on a poll
//! interval, pushing a new snapshot only when it differs from the last one
//! pushed (§10.5 — avoids spurious probe reconfiguration from an unchanged
//! file).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use common::RuntimeConfig;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{decode_runtime_config, Loader};
use crate::error::ConfigError;

pub struct FileLoader {
    path: PathBuf,
    poll_interval: Duration,
    shutdown: CancellationToken,
    last: Mutex<Option<RuntimeConfig>>,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self { path: path.into(), poll_interval, shutdown: CancellationToken::new(), last: Mutex::new(None) }
    }

    async fn read_once(&self) -> Result<RuntimeConfig, ConfigError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {e}", self.path.display())))?;
        decode_runtime_config(&bytes)
    }
}

#[async_trait]
impl Loader for FileLoader {
    async fn run(&self, tx: mpsc::Sender<RuntimeConfig>) -> Result<(), ConfigError> {
        loop {
            match self.read_once().await {
                Ok(cfg) => {
                    let mut last = self.last.lock().await;
                    if last.as_ref() != Some(&cfg) {
                        tracing::info!(path = %self.path.display(), "runtime config changed, pushing snapshot");
                        if tx.send(cfg.clone()).await.is_err() {
                            return Ok(());
                        }
                        *last = Some(cfg);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to load runtime config, keeping previous snapshot");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let loader = FileLoader::new("/nonexistent/sparrow_runtime.yaml", Duration::from_secs(60));
        assert!(loader.read_once().await.is_err());
    }

    #[tokio::test]
    async fn reads_and_decodes_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.yaml");
        tokio::fs::write(&path, "health:\n  targets: [\"https://example.com\"]\n  interval: 30s\n  timeout: 5s\n")
            .await
            .unwrap();

        let loader = FileLoader::new(&path, Duration::from_secs(60));
        let cfg = loader.read_once().await.unwrap();
        assert!(cfg.health.is_some());
    }
}
