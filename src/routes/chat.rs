// POST handlers for the assistant: mode-dispatched chat and the cluster-aware question

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{AppState, provider_failure, record_exchange};
use crate::bedrock::ChatRequest;
use crate::cluster_repo::cluster_context_prompt;
use crate::models::InferenceParams;

/// POST /api/chat: always 200; provider failures come back as `responseType: "error"`.
pub(super) async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    info!(mode = ?request.mode, "chat request");
    let result = state.assistant.respond(&request).await;
    record_exchange(
        &state,
        request.session_id.as_deref(),
        &request.prompt,
        &result,
    )
    .await;
    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AskRequest {
    question: String,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    inference: InferenceParams,
    #[serde(default)]
    session_id: Option<String>,
}

/// POST /api/clusters/{name}/ask: answer a question with the cluster's facts in the prompt.
pub(super) async fn ask_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<AskRequest>,
) -> Response {
    let cluster = match state.clusters.describe_cluster(&name).await {
        Ok(c) => c,
        Err(e) => {
            warn!(cluster = %name, error = %e, "describe cluster failed");
            return provider_failure(&e);
        }
    };
    let overview = match state.clusters.compute_overview(&name).await {
        Ok(o) => Some(o),
        Err(e) => {
            warn!(cluster = %name, error = %e, "asking without compute context");
            None
        }
    };
    let prompt = cluster_context_prompt(&cluster, overview.as_ref(), &request.question);
    let model_id = request
        .model_id
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.bedrock.model_id.clone());
    let result = state
        .assistant
        .invoke_model(&model_id, &prompt, &request.inference)
        .await;
    record_exchange(
        &state,
        request.session_id.as_deref(),
        &request.question,
        &result,
    )
    .await;
    Json(result).into_response()
}
