//! `AppState` construction, extracted from `main.rs` so `serve` and any
//! future one-shot CLI commands share the same boot path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use ck_domain::config::{Config, ConfigSeverity};
use ck_knowledge::embedder::Embedder;
use ck_knowledge::KnowledgeIndex;
use ck_memory::MemoryStore;
use ck_persistence::Db;
use ck_providers::router::LlmRouter;
use ck_sessions::{IdentityCache, SessionStore, TranscriptWriter};
use ck_specialists::registry::SpecialistRegistry;
use ck_tools::{ProcessManager, ToolBridge};

use crate::state::AppState;

const IDENTITY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`]. Shared by `serve` and any CLI command that needs the
/// runtime without an HTTP listener.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    std::fs::create_dir_all(&config.workspace.state_path)
        .context("creating state directory")?;

    let db = Arc::new(
        Db::open(&config.workspace.state_path.join("cirkelline.db"), 8)
            .await
            .context("opening database")?,
    );
    tracing::info!(path = %config.workspace.state_path.display(), "database ready");

    // Repurposes the workspace path (no longer used for persona-file
    // injection) as the specialist manifest root.
    let specialists_root = config.workspace.path.join("specialists");
    std::fs::create_dir_all(&specialists_root).ok();

    let embedder_endpoint = std::env::var("CIRKELLINE_EMBEDDER_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:11434".to_string());
    let embedder_model = std::env::var("CIRKELLINE_EMBEDDER_MODEL")
        .unwrap_or_else(|_| "nomic-embed-text".to_string());
    let embedder = Arc::new(Embedder::new(embedder_endpoint, embedder_model));

    let specialists = Arc::new(
        SpecialistRegistry::load(&specialists_root, &embedder)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "no specialists loaded, falling back to orchestrator-only routing");
                SpecialistRegistry::empty()
            }),
    );
    tracing::info!(
        specialists = specialists.list_capabilities().len(),
        "specialist registry ready"
    );

    let llm = Arc::new(LlmRouter::from_config(&config.llm).context("initializing LLM providers")?);
    tracing::info!("LLM router ready");

    let sessions = Arc::new(SessionStore::new(db.clone()));
    let transcripts = Arc::new(TranscriptWriter::new(&config.workspace.state_path.join("transcripts")));
    let session_locks = Arc::new(crate::runtime::session_lock::SessionLockMap::new());
    let cancel_map = Arc::new(crate::runtime::cancel::CancelMap::new());
    tracing::info!("session store, locks, and cancel map ready");

    let memory = Arc::new(MemoryStore::new(db.clone()));

    let knowledge = Arc::new(KnowledgeIndex::new(db.clone(), embedder.clone(), ck_knowledge::DEFAULT_RRF, 3));

    let processes = ProcessManager::new(config.tools.exec.clone());
    let tools = Arc::new(ToolBridge::new(
        processes,
        config.workspace.state_path.join("tool-workspace"),
    ));
    tracing::info!(tools = tools.discover().len(), "tool bridge ready");

    let identity_cache = Arc::new(RwLock::new(IdentityCache::new(IDENTITY_CACHE_TTL)));

    Ok(AppState {
        config,
        db,
        identity_cache,
        sessions,
        transcripts,
        session_locks,
        memory,
        knowledge,
        embedder,
        specialists,
        llm,
        tools,
        cancel_map,
        user_facts_cache: Arc::new(RwLock::new(std::collections::HashMap::new())),
    })
}

/// Read once at startup and hash for constant-time comparison against
/// inbound bearer tokens.
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
