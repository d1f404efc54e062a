// GET handlers: version, clusters, compute overview, permissions, model catalog, latest trace

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::{AppState, message, provider_failure};
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

pub(super) async fn list_clusters(State(state): State<AppState>) -> Response {
    match state.clusters.list_clusters().await {
        Ok(clusters) => Json(clusters).into_response(),
        Err(e) => {
            warn!(error = %e, "list clusters failed");
            provider_failure(&e)
        }
    }
}

/// GET /api/clusters/{name}/compute: nodes, pods and capacity; falls back to nodegroup sizing.
pub(super) async fn compute_overview(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.clusters.compute_overview(&name).await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => {
            warn!(cluster = %name, error = %e, "compute overview failed");
            provider_failure(&e)
        }
    }
}

/// GET /api/clusters/{name}/permissions: `{"pods:list": true, ...}` for the dashboard's credentials.
pub(super) async fn cluster_permissions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.clusters.check_permissions(&name).await {
        Ok(permissions) => Json(permissions).into_response(),
        Err(e) => {
            warn!(cluster = %name, error = %e, "permission check failed");
            provider_failure(&e)
        }
    }
}

pub(super) async fn list_models(State(state): State<AppState>) -> Response {
    match state.assistant.list_models().await {
        Ok(models) => Json(models).into_response(),
        Err(e) => {
            warn!(error = %e, "list foundation models failed");
            provider_failure(&e)
        }
    }
}

/// GET /api/trace/latest: the merged trace of the most recent agent call, if persisted.
pub(super) async fn latest_trace(State(state): State<AppState>) -> Response {
    let latest = match state.assistant.artifact() {
        Some(artifact) => artifact.read_latest().await,
        None => None,
    };
    match latest {
        Some(trace) => Json(trace).into_response(),
        None => message(StatusCode::NOT_FOUND, "no trace recorded"),
    }
}
