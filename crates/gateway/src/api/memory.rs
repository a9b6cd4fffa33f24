//! Memory Store API endpoints — search, list, and delete memories derived
//! for the authenticated caller.

use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ck_domain::model::Caller;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

pub async fn search(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<SearchQuery>,
) -> impl IntoResponse {
    match state.memory.search(&caller, &q.query, q.limit).await {
        Ok(memories) => Json(serde_json::json!({ "memories": memories })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    20
}

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ListQuery>,
) -> impl IntoResponse {
    match state.memory.list(&caller, q.cursor.as_deref(), q.limit).await {
        Ok(page) => Json(serde_json::json!({
            "memories": page.memories,
            "next_cursor": page.next_cursor,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.memory.delete(&caller, &id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
