//! HTTP API (§6, §10.6): `/checks/{name}`, `/v1alpha1/openapi`, `/metrics`,
//! plus `/healthz` (the lightweight diagnostics endpoint the teacher keeps
//! alongside its main API).

pub mod openapi;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/checks/{name}", get(get_check))
        .route("/v1alpha1/openapi", get(get_openapi))
        .route("/metrics", get(get_metrics))
        .route("/healthz", get(get_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_check(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.store.get(&name).await {
        Some(result) => Json(result).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no result stored for check '{name}'")).into_response(),
    }
}

async fn get_openapi(State(state): State<AppState>) -> Response {
    let schemas = state.reconciler.schemas().await;
    Json(openapi::document(&schemas)).into_response()
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    let metric_families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type())],
        buffer,
    )
        .into_response()
}

async fn get_healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::Reconciler;
    use crate::store::ResultStore;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let registry = prometheus::Registry::new();
        let store = ResultStore::new();
        let reconciler = Reconciler::new(registry.clone(), store.clone(), false, CancellationToken::new());
        AppState { store, registry, reconciler }
    }

    #[tokio::test]
    async fn unknown_check_is_404() {
        let app = router(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/checks/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_check_roundtrips_as_json() {
        let state = test_state();
        state.store.save("health", common::StoredResult::new(serde_json::json!({"a": "healthy"}), chrono::Utc::now())).await;
        let app = router(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/checks/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_exposition() {
        let app = router(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/metrics").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
