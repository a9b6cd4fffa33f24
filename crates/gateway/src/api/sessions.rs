//! Session Store API endpoints — list, inspect, and delete sessions owned
//! by the authenticated caller, plus stopping an in-flight turn.

use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ck_domain::model::Caller;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    match state.sessions.list_for(&caller, q.cursor.as_deref(), q.limit).await {
        Ok(page) => Json(serde_json::json!({
            "sessions": page.sessions,
            "next_cursor": page.next_cursor,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let session = match state.sessions.load(&session_id, &caller).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let turns = state.sessions.turns(&session_id).await.unwrap_or_default();

    Json(serde_json::json!({
        "session": session,
        "turns": turns,
    }))
    .into_response()
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.delete(&session_id, &caller).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn stop_session(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let found = state.cancel_map.cancel(&session_id);
    Json(serde_json::json!({ "stopped": found }))
}
