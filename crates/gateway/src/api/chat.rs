//! Chat API endpoints — the primary interface for running orchestrator turns.
//!
//! - `POST /v1/chat`        — non-streaming: drains the turn and returns the final answer
//! - `POST /v1/chat/stream` — SSE streaming: forwards each filtered [`TurnEvent`]

use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::Deserialize;

use ck_domain::model::Caller;

use crate::runtime::{run_turn, TurnEvent, TurnInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Session to continue. Absent, empty, or foreign ids mint a fresh one.
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let input = TurnInput {
        caller,
        incoming_session_id: body.session_id,
        message: body.message,
    };

    let (session_id, mut rx) = match run_turn(state, input).await {
        Ok(v) => v,
        Err(e) => {
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let mut content = String::new();
    let mut errors = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Token { text } => content.push_str(&text),
            TurnEvent::Final { content: c, .. } => content = c,
            TurnEvent::Stopped { content: c } => content = c,
            TurnEvent::Error { message } => errors.push(message),
            _ => {}
        }
    }

    Json(serde_json::json!({
        "session_id": session_id,
        "content": content,
        "errors": errors,
    }))
    .into_response()
}

pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let input = TurnInput {
        caller,
        incoming_session_id: body.session_id,
        message: body.message,
    };

    let (session_id, rx) = match run_turn(state, input).await {
        Ok(v) => v,
        Err(e) => {
            let stream = futures_util::stream::once(async move {
                Ok::<_, std::convert::Infallible>(
                    Event::default()
                        .event("error")
                        .data(serde_json::json!({ "error": e.to_string() }).to_string()),
                )
            });
            return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
        }
    };

    let stream = make_sse_stream(session_id, rx);

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn make_sse_stream(
    session_id: String,
    mut rx: tokio::sync::mpsc::Receiver<TurnEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        yield Ok(Event::default().event("session").data(session_id));
        while let Some(event) = rx.recv().await {
            let event_type = match &event {
                TurnEvent::Token { .. } => "token",
                TurnEvent::ToolCallStart { .. } => "tool_call_start",
                TurnEvent::ToolCallEnd { .. } => "tool_call_end",
                TurnEvent::SubSpecialistDispatch { .. } => "sub_specialist_dispatch",
                TurnEvent::SubSpecialistResult { .. } => "sub_specialist_result",
                TurnEvent::Final { .. } => "final",
                TurnEvent::Stopped { .. } => "stopped",
                TurnEvent::Error { .. } => "error",
            };
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}
