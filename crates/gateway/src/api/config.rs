//! Config introspection — the effective, redacted configuration the
//! gateway booted with. Credentials never leave the process: API keys are
//! resolved from environment/keyring at call time, not held on `Config`,
//! but legacy fields that do carry one are blanked out here too.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let mut value = match serde_json::to_value(state.config.as_ref()) {
        Ok(v) => v,
        Err(e) => {
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    if let Some(key) = value
        .get_mut("serial_memory")
        .and_then(|v| v.get_mut("api_key"))
    {
        *key = serde_json::Value::Null;
    }

    Json(value).into_response()
}
