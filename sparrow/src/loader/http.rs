//! HTTP-polling loader: polls a URL on an interval, honoring `ETag` when the
//! server provides one and otherwise falling back to comparing decoded
//! snapshots, same as [`super::file::FileLoader`].

use std::time::Duration;

use async_trait::async_trait;
use common::RuntimeConfig;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{decode_runtime_config, Loader};
use crate::error::ConfigError;

pub struct HttpLoader {
    url: String,
    poll_interval: Duration,
    client: reqwest::Client,
    shutdown: CancellationToken,
    state: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    etag: Option<String>,
    last: Option<RuntimeConfig>,
}

impl HttpLoader {
    pub fn new(url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            url: url.into(),
            poll_interval,
            client: reqwest::Client::new(),
            shutdown: CancellationToken::new(),
            state: Mutex::new(PollState::default()),
        }
    }

    /// Fetches once. Returns `Ok(None)` for a conditional-request 304 (no
    /// change) and `Ok(Some(cfg))` otherwise.
    async fn fetch_once(&self) -> Result<Option<RuntimeConfig>, ConfigError> {
        let mut request = self.client.get(&self.url);
        {
            let state = self.state.lock().await;
            if let Some(etag) = &state.etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag.clone());
            }
        }

        let response = request.send().await.map_err(|e| ConfigError::Load(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ConfigError::Load(format!("unexpected status {}", response.status())));
        }

        let etag = response.headers().get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| ConfigError::Load(e.to_string()))?;
        let cfg = decode_runtime_config(&bytes)?;

        let mut state = self.state.lock().await;
        if etag.is_some() {
            state.etag = etag;
        }
        Ok(Some(cfg))
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn run(&self, tx: mpsc::Sender<RuntimeConfig>) -> Result<(), ConfigError> {
        loop {
            match self.fetch_once().await {
                Ok(Some(cfg)) => {
                    let mut state = self.state.lock().await;
                    if state.last.as_ref() != Some(&cfg) {
                        tracing::info!(url = %self.url, "runtime config changed, pushing snapshot");
                        if tx.send(cfg.clone()).await.is_err() {
                            return Ok(());
                        }
                        state.last = Some(cfg);
                    }
                }
                Ok(None) => {
                    tracing::debug!(url = %self.url, "runtime config not modified");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "failed to poll runtime config, keeping previous snapshot");
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
