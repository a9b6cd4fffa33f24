pub mod auth;
pub mod chat;
pub mod config;
pub mod health;
pub mod knowledge;
pub mod memory;
pub mod sessions;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware, which resolves a full
/// `Caller` rather than a bare boolean).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        // Memory Store
        .route("/v1/memory/search", get(memory::search))
        .route("/v1/memory", get(memory::list))
        .route("/v1/memory/:id", delete(memory::delete_entry))
        // Session Store
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:id", get(sessions::get_session))
        .route("/v1/sessions/:id", delete(sessions::delete_session))
        .route("/v1/sessions/:id/stop", post(sessions::stop_session))
        // Orchestrator entry points
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/stream", post(chat::chat_stream))
        // Knowledge Index
        .route("/v1/knowledge/documents", post(knowledge::ingest_document))
        .route("/v1/knowledge/documents", get(knowledge::list_documents))
        .route("/v1/knowledge/search", get(knowledge::search))
        // Config introspection (redacted)
        .route("/v1/config", get(config::get_config))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_caller,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
