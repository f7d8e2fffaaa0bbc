//! Shared state handed to every axum handler (§4.I "the HTTP API ... reads
//! the store and the Prometheus registry ... it never talks to probes
//! directly").

use std::sync::Arc;

use prometheus::Registry;

use crate::reconciler::Reconciler;
use crate::store::ResultStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResultStore>,
    pub registry: Registry,
    pub reconciler: Arc<Reconciler>,
}
