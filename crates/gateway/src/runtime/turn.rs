//! The orchestrator — the state machine that turns one inbound message
//! into a caller-visible event stream.
//!
//! `Admitted → ContextAssembled → Routed → Streaming → Finalized →
//! MemoryDerived → Done`, with `Cancelled` reachable from any state once
//! the caller disconnects or the per-session cancel token fires. A turn
//! that fails before `Streaming` produces one `TurnEvent::Error` and
//! writes nothing; a turn cancelled mid-stream writes nothing either —
//! only a `Finalized` turn is persisted.

use std::collections::HashMap;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use ck_domain::capability::ModelRole;
use ck_domain::error::{Error, Result};
use ck_domain::model::{Caller, ConnectionState, SpecialistDescriptor, SpecialistKind, TurnRole};
use ck_domain::stream::StreamEvent;
use ck_domain::tool::{Message, MessageContent, Role, ToolCall, ToolDefinition};
use ck_providers::traits::ChatRequest;
use ck_contextpack::truncation::{apply_total_cap, truncate_per_file, Section};

use crate::state::AppState;

use super::cancel::CancelToken;
use super::event_filter::{EventFilter, EventPolicy};

/// Tool-call round-trips allowed within one specialist invocation before
/// the orchestrator gives up and returns whatever text it has.
const MAX_TOOL_LOOPS: usize = 5;

/// At most this many fallback specialists are tried after the primary
/// fails mid-stream.
const MAX_FALLBACKS: usize = 2;

/// How many of a session's most recent turns are folded into the prompt
/// verbatim; anything older is represented only by the running summary.
const RECENT_TURN_WINDOW: i64 = 12;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Caller-visible events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a turn, already passed through the [`EventFilter`].
/// `source` names the specialist (or `"orchestrator"`) the event came from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "token")]
    Token { text: String },

    #[serde(rename = "tool_call_start")]
    ToolCallStart { call_id: String, tool_name: String },

    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        call_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    #[serde(rename = "sub_specialist_dispatch")]
    SubSpecialistDispatch { name: String },

    #[serde(rename = "sub_specialist_result")]
    SubSpecialistResult { name: String },

    #[serde(rename = "final")]
    Final {
        content: String,
        session_id: String,
    },

    #[serde(rename = "stopped")]
    Stopped { content: String },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Input to a single turn.
pub struct TurnInput {
    pub caller: Caller,
    /// Session the caller claims to be continuing, if any. Absent, empty,
    /// or foreign ids always mint a fresh session — see
    /// `SessionStore::resolve_or_mint`.
    pub incoming_session_id: Option<String>,
    pub message: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Admit the turn, resolve/mint its session, register a cancel token, and
/// spawn the rest of the state machine. Returns immediately with the
/// resolved session id and a receiver the caller drains for SSE or
/// aggregates for a non-streaming response.
pub async fn run_turn(
    state: AppState,
    input: TurnInput,
) -> Result<(String, mpsc::Receiver<TurnEvent>)> {
    // ── Admitted ──────────────────────────────────────────────────
    let session_id = state
        .sessions
        .resolve_or_mint(&input.caller, input.incoming_session_id.as_deref())
        .await?;
    emit_transition(&session_id, "Admitted");

    let (tx, rx) = mpsc::channel::<TurnEvent>(64);
    let cancel = state.cancel_map.register(&session_id);
    let session_id_for_task = session_id.clone();

    tokio::spawn(async move {
        let permit = match state.session_locks.acquire(&session_id_for_task).await {
            Ok(p) => p,
            Err(busy) => {
                let _ = tx
                    .send(TurnEvent::Error {
                        message: busy.to_string(),
                    })
                    .await;
                state.cancel_map.remove(&session_id_for_task);
                return;
            }
        };

        run_turn_inner(&state, input, &session_id_for_task, &tx, &cancel).await;

        drop(permit);
        state.cancel_map.remove(&session_id_for_task);
    });

    Ok((session_id, rx))
}

async fn run_turn_inner(
    state: &AppState,
    input: TurnInput,
    session_id: &str,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) {
    if let Err(e) = state
        .sessions
        .append_turn(session_id, &input.caller, TurnRole::User, &input.message, None)
        .await
    {
        let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
        return;
    }
    mirror_transcript(state, session_id, "user", &input.message);

    // ── ContextAssembled ──────────────────────────────────────────
    let assembled = match assemble_context(state, &input.caller, session_id, &input.message).await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
            return;
        }
    };
    emit_transition(session_id, "ContextAssembled");

    if cancel.is_cancelled() {
        emit_transition(session_id, "Cancelled");
        let _ = tx.send(TurnEvent::Stopped { content: String::new() }).await;
        return;
    }

    // ── Routed ────────────────────────────────────────────────────
    let available_tools: Vec<String> = state
        .tools
        .discover()
        .iter()
        .map(|d| d.name.to_string())
        .collect();
    let connection_states: HashMap<String, ConnectionState> = HashMap::new();

    let route = match state
        .specialists
        .route(&input.message, &available_tools, &connection_states, &state.embedder)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "specialist routing failed, handling directly");
            Vec::new()
        }
    };
    emit_transition(session_id, "Routed");

    // ── Streaming ─────────────────────────────────────────────────
    let mut filter = EventFilter::new();
    let outcome = if route.is_empty() {
        stream_orchestrator_direct(state, &assembled.system_prompt, &input.message, tx, &mut filter, cancel).await
    } else {
        stream_with_fallbacks(state, &input.caller, &assembled.system_prompt, &input.message, &route, tx, &mut filter, cancel).await
    };

    let (final_text, specialist_name, cancelled) = match outcome {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
            return;
        }
    };

    if cancelled {
        emit_transition(session_id, "Cancelled");
        let _ = tx
            .send(TurnEvent::Stopped { content: final_text })
            .await;
        return;
    }

    // ── Finalized ─────────────────────────────────────────────────
    let is_team = specialist_name
        .as_deref()
        .and_then(|n| state.specialists.lookup(n))
        .map(|d| d.kind == SpecialistKind::Team)
        .unwrap_or(false);

    let final_text = if is_team {
        rewrite_in_own_voice(state, &final_text).await.unwrap_or(final_text)
    } else {
        final_text
    };

    let assistant_turn = match state
        .sessions
        .append_turn(
            session_id,
            &input.caller,
            TurnRole::Assistant,
            &final_text,
            specialist_name.as_deref(),
        )
        .await
    {
        Ok(t) => t,
        Err(e) => {
            let _ = tx.send(TurnEvent::Error { message: e.to_string() }).await;
            return;
        }
    };

    mirror_transcript(state, session_id, "assistant", &final_text);
    emit_transition(session_id, "Finalized");

    let _ = tx
        .send(TurnEvent::Final {
            content: final_text.clone(),
            session_id: session_id.to_string(),
        })
        .await;

    // ── MemoryDerived ─────────────────────────────────────────────
    // Fire-and-forget: memory derivation never affects turn success.
    emit_transition(session_id, "MemoryDerived");
    spawn_memory_derivation(state, input.caller, session_id.to_string(), assistant_turn.id, final_text);

    // ── Done ──────────────────────────────────────────────────────
    emit_transition(session_id, "Done");
}

fn emit_transition(session_id: &str, state: &str) {
    ck_domain::trace::TraceEvent::TurnTransition {
        session_id: session_id.to_string(),
        state: state.to_string(),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ContextAssembled
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct AssembledContext {
    system_prompt: String,
}

/// Deterministically assemble the system prompt: preamble, admin-profile
/// note, condensed summary, cited retrieved chunks, recent turn window.
/// Sections are budgeted with the most disposable content (retrieved
/// chunks, then the summary) placed last, so it is truncated or dropped
/// first when the total cap is exceeded — the recent turn window and
/// user facts survive longest.
async fn assemble_context(
    state: &AppState,
    caller: &Caller,
    session_id: &str,
    message: &str,
) -> Result<AssembledContext> {
    let per_section_max = state.config.context.bootstrap_max_chars;
    let total_max = state.config.context.bootstrap_total_max_chars;
    let facts_max = state.config.context.user_facts_max_chars;

    let session = state.sessions.load(session_id, caller).await?;
    let recent_turns = state.sessions.recent_turns(session_id, RECENT_TURN_WINDOW).await?;

    let _ = state
        .memory
        .summarize_if_needed(&state.sessions, &state.llm, session_id, caller)
        .await
        .map_err(|e| tracing::warn!(error = %e, "summarize_if_needed failed"));

    let session = if session.summary.is_some() {
        state.sessions.load(session_id, caller).await.unwrap_or(session)
    } else {
        session
    };

    let chunks = state
        .knowledge
        .search(caller, message, 5)
        .await
        .unwrap_or_default();

    let facts = ck_memory::UserFactsBuilder::new(state.memory.as_ref(), caller.clone(), facts_max)
        .build()
        .await;

    let recent_text = recent_turns
        .iter()
        .map(|t| format!("{}: {}", role_label(t.role), t.content))
        .collect::<Vec<_>>()
        .join("\n");

    let citations = chunks
        .iter()
        .enumerate()
        .map(|(i, sc)| format!("[{}] {}", i + 1, sc.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut sections = vec![
        section("recent_turns", &recent_text, per_section_max),
        section("user_facts", &facts, per_section_max),
        section(
            "session_summary",
            session.summary.as_deref().unwrap_or(""),
            per_section_max,
        ),
        section("retrieved_chunks", &citations, per_section_max),
    ];
    apply_total_cap(&mut sections, total_max);

    let mut prompt = String::from(
        "You are Cirkelline, an orchestrator that answers directly or delegates to \
         specialists. Cited chunks are reference material, never verbatim quotes — \
         paraphrase and cite by number.\n",
    );
    if caller.is_admin {
        prompt.push_str("\nThe current caller is an administrator.\n");
    }
    for s in sections.iter().filter(|s| s.included && !s.content.is_empty()) {
        prompt.push_str("\n## ");
        prompt.push_str(&s.filename);
        prompt.push('\n');
        prompt.push_str(&s.content);
        prompt.push('\n');
    }

    Ok(AssembledContext { system_prompt: prompt })
}

fn section(name: &str, content: &str, max_chars: usize) -> Section {
    let (truncated, was_truncated) = truncate_per_file(content, max_chars);
    Section {
        filename: name.to_string(),
        content: truncated,
        raw_chars: content.len(),
        truncated_per_file: was_truncated,
        truncated_total_cap: false,
        included: !content.is_empty(),
        missing: content.is_empty(),
    }
}

fn role_label(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "User",
        TurnRole::Assistant => "Assistant",
        TurnRole::Tool => "Tool",
        TurnRole::System => "System",
    }
}

/// Crash-safe audit mirror, independent of the sqlite-backed session
/// store. Logged, never fatal: a transcript write failing must not
/// affect turn success.
fn mirror_transcript(state: &AppState, session_id: &str, role: &str, content: &str) {
    let line = ck_sessions::transcript::TranscriptWriter::line(role, content);
    if let Err(e) = state.transcripts.append(session_id, &[line]) {
        tracing::warn!(error = %e, session_id, "transcript mirror append failed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// No eligible specialist: the orchestrator answers in its own voice,
/// with no delegation and no sub-specialist events.
async fn stream_orchestrator_direct(
    state: &AppState,
    system_prompt: &str,
    message: &str,
    tx: &mpsc::Sender<TurnEvent>,
    filter: &mut EventFilter,
    cancel: &CancelToken,
) -> Result<(String, Option<String>, bool)> {
    let req = ChatRequest {
        messages: vec![Message::system(system_prompt), Message::user(message)],
        temperature: Some(0.3),
        ..Default::default()
    };
    let (text, cancelled) =
        drive_stream(state, ModelRole::Executor, req, "orchestrator", tx, filter, cancel).await?;
    Ok((text, None, cancelled))
}

/// Invoke the primary specialist; on mid-stream failure, retry with a
/// fresh stream against the next pre-authorized fall-back (at most
/// [`MAX_FALLBACKS`]). Already-sent tokens are never retracted — the
/// fallback just keeps appending to the same accumulated text.
async fn stream_with_fallbacks(
    state: &AppState,
    caller: &Caller,
    system_prompt: &str,
    message: &str,
    route: &[SpecialistDescriptor],
    tx: &mpsc::Sender<TurnEvent>,
    filter: &mut EventFilter,
    cancel: &CancelToken,
) -> Result<(String, Option<String>, bool)> {
    let mut accumulated = String::new();
    let candidates = route.iter().take(1 + MAX_FALLBACKS);

    for (idx, specialist) in candidates.enumerate() {
        if idx > 0 {
            let _ = tx
                .send(TurnEvent::SubSpecialistDispatch {
                    name: specialist.name.clone(),
                })
                .await;
        }

        let persona_prompt = format!(
            "{system_prompt}\n\n## Specialist persona: {}\n{}",
            specialist.name, specialist.description
        );
        let tool_defs = tool_definitions_for(state, specialist);

        let req = ChatRequest {
            messages: vec![Message::system(&persona_prompt), Message::user(message)],
            tools: tool_defs,
            temperature: Some(0.3),
            ..Default::default()
        };

        match drive_tool_loop(state, caller, ModelRole::Executor, req, &specialist.name, tx, filter, cancel).await {
            Ok((text, cancelled)) => {
                accumulated.push_str(&text);
                let _ = tx
                    .send(TurnEvent::SubSpecialistResult {
                        name: specialist.name.clone(),
                    })
                    .await;
                return Ok((accumulated, Some(specialist.name.clone()), cancelled));
            }
            Err(e) => {
                tracing::warn!(specialist = %specialist.name, error = %e, "specialist failed, trying next");
                continue;
            }
        }
    }

    Err(Error::Provider {
        provider: "router".into(),
        message: "primary and all fall-back specialists failed".into(),
    })
}

/// Run one streaming chat call with no tool support, relaying tokens
/// through `filter` with the primary policy.
async fn drive_stream(
    state: &AppState,
    role: ModelRole,
    req: ChatRequest,
    source: &str,
    tx: &mpsc::Sender<TurnEvent>,
    filter: &mut EventFilter,
    cancel: &CancelToken,
) -> Result<(String, bool)> {
    let mut stream = state.llm.chat_stream_for_role(role, req).await?;
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            return Ok((text, true));
        }
        match event? {
            StreamEvent::Token { text: t } => {
                text.push_str(&t);
                if let Some(ev) = filter.apply(source, EventPolicy::PRIMARY, TurnEvent::Token { text: t }) {
                    let _ = tx.send(ev).await;
                }
            }
            StreamEvent::Done { .. } => break,
            StreamEvent::Error { message } => return Err(Error::Provider { provider: source.into(), message }),
            _ => {}
        }
    }
    Ok((text, false))
}

/// Streaming chat call with tool-call dispatch: assembles tool calls from
/// the stream, invokes them through the Tool Bridge, and feeds results
/// back for up to [`MAX_TOOL_LOOPS`] rounds.
async fn drive_tool_loop(
    state: &AppState,
    caller: &Caller,
    role: ModelRole,
    mut req: ChatRequest,
    source: &str,
    tx: &mpsc::Sender<TurnEvent>,
    filter: &mut EventFilter,
    cancel: &CancelToken,
) -> Result<(String, bool)> {
    let mut final_text = String::new();

    for _ in 0..MAX_TOOL_LOOPS {
        if cancel.is_cancelled() {
            return Ok((final_text, true));
        }

        let mut stream = state.llm.chat_stream_for_role(role, req.clone()).await?;
        let mut text = String::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Ok((final_text + &text, true));
            }
            match event? {
                StreamEvent::Token { text: t } => {
                    text.push_str(&t);
                    if let Some(ev) = filter.apply(source, EventPolicy::PRIMARY, TurnEvent::Token { text: t }) {
                        let _ = tx.send(ev).await;
                    }
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    if let Some(ev) = filter.apply(
                        source,
                        EventPolicy::PRIMARY,
                        TurnEvent::ToolCallStart { call_id: call_id.clone(), tool_name: tool_name.clone() },
                    ) {
                        let _ = tx.send(ev).await;
                    }
                    tc_bufs.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    pending.push(ToolCall { call_id: call_id.clone(), tool_name, arguments });
                    tc_bufs.remove(&call_id);
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => {
                    return Err(Error::Provider { provider: source.into(), message })
                }
            }
        }

        for (call_id, (tool_name, args_str)) in tc_bufs.drain() {
            let arguments = serde_json::from_str(&args_str).unwrap_or(Value::Object(Default::default()));
            pending.push(ToolCall { call_id, tool_name, arguments });
        }

        final_text.push_str(&text);

        if pending.is_empty() {
            return Ok((final_text, false));
        }

        req.messages.push(assistant_tool_message(&text, &pending));
        for tc in &pending {
            let result = match state.tools.invoke(&caller.id, &tc.tool_name, tc.arguments.clone()).await {
                Ok(v) => (v.to_string(), false),
                Err(e) => (e.to_string(), true),
            };
            if let Some(ev) = filter.apply(
                source,
                EventPolicy::PRIMARY,
                TurnEvent::ToolCallEnd {
                    call_id: tc.call_id.clone(),
                    tool_name: tc.tool_name.clone(),
                    is_error: result.1,
                },
            ) {
                let _ = tx.send(ev).await;
            }
            req.messages.push(Message::tool_result(&tc.call_id, &result.0));
        }
    }

    Ok((final_text, false))
}

fn assistant_tool_message(text: &str, calls: &[ToolCall]) -> Message {
    use ck_domain::tool::ContentPart;
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(ContentPart::Text { text: text.to_string() });
    }
    for tc in calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }
    Message { role: Role::Assistant, content: MessageContent::Parts(parts) }
}

fn tool_definitions_for(state: &AppState, specialist: &SpecialistDescriptor) -> Vec<ToolDefinition> {
    if specialist.tool_requirements.is_empty() {
        return Vec::new();
    }
    state
        .tools
        .discover()
        .iter()
        .filter(|d| specialist.tool_requirements.iter().any(|r| r == d.name))
        .map(|d| ToolDefinition {
            name: d.name.to_string(),
            description: d.description.to_string(),
            // The bridge validates arguments against the concrete request
            // type at invoke time; a permissive schema here just lets the
            // model see the tool exists.
            parameters: serde_json::json!({ "type": "object" }),
        })
        .collect()
}

/// One non-streaming call in the orchestrator's own voice, used only when
/// the primary specialist was a Team (the default "team_only" rewrite
/// policy). No new retrieval — the Team's merged response is the only
/// input.
async fn rewrite_in_own_voice(state: &AppState, specialist_text: &str) -> Result<String> {
    let req = ChatRequest {
        messages: vec![
            Message::system(
                "Rewrite the following response in your own voice, preserving every \
                 fact and any citations. Do not add new claims.",
            ),
            Message::user(specialist_text),
        ],
        temperature: Some(0.2),
        ..Default::default()
    };
    let resp = state.llm.chat_for_role(ModelRole::Executor, req).await?;
    Ok(resp.content)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryDerived
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Best-effort, fire-and-forget: a failed derivation never fails the turn
/// that already completed and was sent to the caller.
fn spawn_memory_derivation(
    state: &AppState,
    caller: Caller,
    session_id: String,
    source_turn_id: String,
    final_text: String,
) {
    let memory = state.memory.clone();
    let llm = state.llm.clone();

    tokio::spawn(async move {
        let prompt = format!(
            "Extract one durable fact about the user from this exchange, if any \
             exists (identity, emotional state, preference, goal, or behavioral \
             pattern). Reply with just the fact in one sentence, or the single word \
             NONE.\n\nEXCHANGE:\n{final_text}"
        );
        let req = ChatRequest {
            messages: vec![Message::user(&prompt)],
            temperature: Some(0.0),
            max_tokens: Some(200),
            ..Default::default()
        };
        let extracted = match llm.chat_for_role(ModelRole::Summarizer, req).await {
            Ok(resp) => resp.content,
            Err(e) => {
                tracing::warn!(error = %e, "memory derivation call failed");
                return;
            }
        };
        if extracted.trim().eq_ignore_ascii_case("none") || extracted.trim().is_empty() {
            return;
        }
        if let Err(e) = memory
            .derive(&caller.id, &source_turn_id, ck_domain::model::MemoryKind::Pattern, extracted.trim())
            .await
        {
            tracing::warn!(error = %e, session_id = %session_id, "memory derivation failed to persist");
        }
    });
}
