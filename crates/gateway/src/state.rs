use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ck_domain::config::Config;
use ck_knowledge::embedder::Embedder;
use ck_knowledge::KnowledgeIndex;
use ck_memory::MemoryStore;
use ck_persistence::Db;
use ck_providers::router::LlmRouter;
use ck_sessions::{IdentityCache, SessionStore, TranscriptWriter};
use ck_specialists::registry::SpecialistRegistry;
use ck_tools::ToolBridge;
use parking_lot::RwLock;

use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Cached user facts with a TTL, used when assembling the admin-profile
/// section of a prompt without re-querying the Memory Store every turn.
#[derive(Clone)]
pub struct CachedUserFacts {
    pub content: String,
    pub fetched_at: Instant,
}

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern, mirroring the component design: identity,
/// sessions, memory, knowledge, specialists, providers, tools, and the
/// security/caching plumbing that ties them together.
#[derive(Clone)]
pub struct AppState {
    // ── Core ─────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub db: Arc<Db>,

    // ── Identity ─────────────────────────────────────────────────────
    pub identity_cache: Arc<RwLock<IdentityCache>>,

    // ── Session Store ────────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub transcripts: Arc<TranscriptWriter>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Memory Store ─────────────────────────────────────────────────
    pub memory: Arc<MemoryStore>,

    // ── Knowledge Index ──────────────────────────────────────────────
    pub knowledge: Arc<KnowledgeIndex>,
    pub embedder: Arc<Embedder>,

    // ── Specialist Registry ──────────────────────────────────────────
    pub specialists: Arc<SpecialistRegistry>,

    // ── Providers (LLM routing) ──────────────────────────────────────
    pub llm: Arc<LlmRouter>,

    // ── Tool Bridge ───────────────────────────────────────────────────
    pub tools: Arc<ToolBridge>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub cancel_map: Arc<CancelMap>,

    // ── Caches ────────────────────────────────────────────────────────
    pub user_facts_cache: Arc<RwLock<HashMap<String, CachedUserFacts>>>,
}
