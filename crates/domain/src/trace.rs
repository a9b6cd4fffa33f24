use serde::Serialize;

/// Structured trace events emitted across all Cirkelline crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// One per orchestrator state-machine transition (§4.7): `Admitted`,
    /// `ContextAssembled`, `Routed`, `Streaming`, `Finalized`,
    /// `MemoryDerived`, `Done`, or `Cancelled`.
    TurnTransition {
        session_id: String,
        state: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "trace_event");
    }
}
