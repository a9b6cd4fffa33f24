//! Knowledge Index API endpoints — document ingestion and hybrid search.

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ck_domain::model::{AccessLevel, Caller};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub shared_with_admins: bool,
}

pub async fn ingest_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<IngestBody>,
) -> impl IntoResponse {
    let access = if body.shared_with_admins {
        AccessLevel::SharedWithAdmins
    } else {
        AccessLevel::Private
    };

    match state.knowledge.ingest(&caller, &body.title, &body.body, access).await {
        Ok(doc) => (axum::http::StatusCode::ACCEPTED, Json(doc)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> impl IntoResponse {
    match state.knowledge.list_documents(&caller).await {
        Ok(docs) => Json(serde_json::json!({ "documents": docs })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

pub async fn search(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<SearchQuery>,
) -> impl IntoResponse {
    match state.knowledge.search(&caller, &q.query, q.k).await {
        Ok(results) => {
            let chunks: Vec<serde_json::Value> = results
                .into_iter()
                .map(|sc| {
                    serde_json::json!({
                        "chunk": sc.chunk,
                        "score": sc.score,
                    })
                })
                .collect();
            Json(serde_json::json!({ "chunks": chunks })).into_response()
        }
        Err(e) => e.into_response(),
    }
}
