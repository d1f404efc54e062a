// HTTP routes: cluster dashboard, assistant chat, sessions

mod chat;
mod http;
mod session;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::bedrock::Assistant;
use crate::cluster_repo::ClusterRepo;
use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::models::{ChatTurn, InvocationResult};
use crate::session_repo::{SessionContext, SessionStore};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) clusters: Arc<ClusterRepo>,
    pub(crate) assistant: Arc<Assistant>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) config: Arc<AppConfig>,
}

pub fn app(
    clusters: Arc<ClusterRepo>,
    assistant: Arc<Assistant>,
    sessions: Arc<dyn SessionStore>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        clusters,
        assistant,
        sessions,
        config: Arc::new(config),
    };
    Router::new()
        .route("/", get(|| async { "eksboard: EKS dashboard and Bedrock assistant" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/clusters", get(http::list_clusters)) // GET /api/clusters
        .route("/api/clusters/{name}/compute", get(http::compute_overview)) // GET compute
        .route("/api/clusters/{name}/permissions", get(http::cluster_permissions)) // GET access
        .route("/api/clusters/{name}/ask", post(chat::ask_cluster)) // POST ask
        .route("/api/models", get(http::list_models)) // GET /api/models
        .route("/api/chat", post(chat::chat_handler)) // POST /api/chat
        .route("/api/trace/latest", get(http::latest_trace)) // GET /api/trace/latest
        .route("/api/sessions", post(session::create_session)) // POST /api/sessions
        .route(
            "/api/sessions/{id}",
            get(session::load_session)
                .put(session::save_session)
                .delete(session::delete_session),
        ) // GET|PUT|DELETE /api/sessions/{id}
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state)
}

pub(crate) fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "message": text.into() }))).into_response()
}

/// Status for a failed provider call outside the chat path.
pub(crate) fn provider_failure(e: &ProviderError) -> Response {
    let status = match e {
        ProviderError::UnknownCluster(_) => StatusCode::NOT_FOUND,
        e if e.is_unauthorized() => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    };
    message(status, e.to_string())
}

/// Keep the exchange in the session blob when the caller named a session. Error results are
/// not recorded.
pub(crate) async fn record_exchange(
    state: &AppState,
    session_id: Option<&str>,
    prompt: &str,
    result: &InvocationResult,
) {
    let Some(id) = session_id.filter(|s| !s.trim().is_empty()) else {
        return;
    };
    if result.is_error() {
        return;
    }
    let session = SessionContext::with_id(state.sessions.clone(), id);
    session
        .append_turns(&[ChatTurn::user(prompt), ChatTurn::assistant(result.output.clone())])
        .await;
}
