// Session blob handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use super::{AppState, message};
use crate::session_repo::{SessionContext, new_session_id};

/// POST /api/sessions: a fresh id; nothing is stored until the first save.
pub(super) async fn create_session() -> impl IntoResponse {
    Json(json!({ "sessionId": new_session_id() }))
}

pub(super) async fn load_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session = SessionContext::with_id(state.sessions.clone(), id);
    Json(session.load().await)
}

pub(super) async fn save_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(data): Json<Value>,
) -> Response {
    let session = SessionContext::with_id(state.sessions.clone(), id);
    if session.save(&data).await {
        Json(json!({ "saved": true, "sessionId": session.session_id() })).into_response()
    } else {
        message(StatusCode::INTERNAL_SERVER_ERROR, "session could not be saved")
    }
}

/// DELETE /api/sessions/{id}: removes the blob and hands back the rotated id.
pub(super) async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let mut session = SessionContext::with_id(state.sessions.clone(), id);
    if session.delete().await {
        Json(json!({ "deleted": true, "sessionId": session.session_id() })).into_response()
    } else {
        message(StatusCode::INTERNAL_SERVER_ERROR, "session could not be deleted")
    }
}
