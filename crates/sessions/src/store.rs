//! The Session Store: create-or-resume a session, append turns to it, and
//! list/load/delete sessions under strict per-caller isolation.
//!
//! Backed by the Persistence Gateway. Concurrent `append_turn` calls on the
//! same session are serialized by the gateway's per-session lock
//! (`runtime::session_lock::SessionLockMap`), not by this store — the store
//! itself assumes single-writer-at-a-time per session and only provides the
//! storage operations.

use std::sync::Arc;

use ck_domain::error::Result;
use ck_domain::model::{Caller, Session, Turn, TurnRole};
use ck_persistence::repo::{sessions as sessions_repo, turns as turns_repo};
use ck_persistence::Db;

/// A page of a caller's sessions, ordered most-recently-updated first.
pub struct SessionPage {
    pub sessions: Vec<Session>,
    /// Opaque cursor to pass back in to fetch the next page; `None` once
    /// the last page has been returned.
    pub next_cursor: Option<String>,
}

pub struct SessionStore {
    db: Arc<Db>,
}

impl SessionStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Resolve an incoming session id to one this caller owns, or mint a
    /// fresh one. An absent, empty, or not-owned incoming id always mints a
    /// new session rather than silently falling back to `None` — a
    /// concrete id is decided here, before any specialist runs.
    pub async fn resolve_or_mint(
        &self,
        caller: &Caller,
        incoming_session_id: Option<&str>,
    ) -> Result<String> {
        if let Some(id) = incoming_session_id.filter(|id| !id.is_empty()) {
            if let Some(session) = sessions_repo::get_owned_by(&self.db, id, &caller.id).await? {
                return Ok(session.id);
            }
        }

        let session = sessions_repo::create(&self.db, caller, None).await?;
        Ok(session.id)
    }

    /// Append one turn to a session already confirmed to belong to `caller`.
    pub async fn append_turn(
        &self,
        session_id: &str,
        caller: &Caller,
        role: TurnRole,
        content: &str,
        specialist: Option<&str>,
    ) -> Result<Turn> {
        // Confirms ownership before writing; `load` reports a foreign or
        // absent session identically, so this surfaces the same error.
        self.load(session_id, caller).await?;
        let turn =
            turns_repo::append(&self.db, session_id, &caller.id, role, content, specialist)
                .await?;
        let added = estimate_tokens(content);
        sessions_repo::touch(&self.db, session_id, added).await?;
        Ok(turn)
    }

    /// List a caller's sessions, most recently updated first.
    pub async fn list_for(
        &self,
        caller: &Caller,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<SessionPage> {
        let all = sessions_repo::list(&self.db, caller).await?;
        let start = match cursor {
            Some(c) => all.iter().position(|s| s.id == c).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        let page: Vec<Session> = all.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + page.len() < all.len() {
            page.last().map(|s| s.id.clone())
        } else {
            None
        };
        Ok(SessionPage {
            sessions: page,
            next_cursor,
        })
    }

    /// Load a session, enforcing ownership. Any mismatch — wrong owner or
    /// no such session — surfaces as `Error::NotFound`.
    pub async fn load(&self, session_id: &str, caller: &Caller) -> Result<Session> {
        sessions_repo::get(&self.db, caller, session_id).await
    }

    /// The turns belonging to a session, oldest first. Caller must already
    /// hold a `Session` obtained via `load`/`resolve_or_mint` for isolation.
    pub async fn turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        turns_repo::list(&self.db, session_id).await
    }

    /// The most recent `limit` turns, oldest first — the window the
    /// orchestrator folds into a prompt.
    pub async fn recent_turns(&self, session_id: &str, limit: i64) -> Result<Vec<Turn>> {
        turns_repo::recent(&self.db, session_id, limit).await
    }

    /// Refresh a session's condensed summary.
    pub async fn set_summary(&self, session_id: &str, summary: &str) -> Result<()> {
        sessions_repo::set_summary(&self.db, session_id, summary).await
    }

    /// Delete a session and cascade to its turns. Memories are untouched.
    pub async fn delete(&self, session_id: &str, caller: &Caller) -> Result<()> {
        sessions_repo::delete(&self.db, caller, session_id).await
    }
}

/// Rough token estimate (chars / 4) used only for the running
/// `total_tokens` counter surfaced to callers; not used for prompt budgeting.
fn estimate_tokens(content: &str) -> u64 {
    (content.len() as u64 / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SessionStore {
        let db = Db::open_in_memory().await.unwrap();
        SessionStore::new(Arc::new(db))
    }

    fn caller(id: &str) -> Caller {
        Caller::anonymous(id)
    }

    #[tokio::test]
    async fn resolve_or_mint_creates_when_absent() {
        let store = store().await;
        let c = caller("u1");
        let id = store.resolve_or_mint(&c, None).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn resolve_or_mint_reuses_owned_session() {
        let store = store().await;
        let c = caller("u1");
        let id = store.resolve_or_mint(&c, None).await.unwrap();
        let again = store.resolve_or_mint(&c, Some(&id)).await.unwrap();
        assert_eq!(id, again);
    }

    #[tokio::test]
    async fn resolve_or_mint_ignores_foreign_session() {
        let store = store().await;
        let owner = caller("u1");
        let other = caller("u2");
        let id = store.resolve_or_mint(&owner, None).await.unwrap();
        let minted = store.resolve_or_mint(&other, Some(&id)).await.unwrap();
        assert_ne!(id, minted);
    }

    #[tokio::test]
    async fn append_turn_and_list() {
        let store = store().await;
        let c = caller("u1");
        let id = store.resolve_or_mint(&c, None).await.unwrap();
        store
            .append_turn(&id, &c, TurnRole::User, "hi", None)
            .await
            .unwrap();
        store
            .append_turn(&id, &c, TurnRole::Assistant, "hello", Some("default"))
            .await
            .unwrap();
        let turns = store.turns(&id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn append_turn_rejects_foreign_caller() {
        let store = store().await;
        let owner = caller("u1");
        let other = caller("u2");
        let id = store.resolve_or_mint(&owner, None).await.unwrap();
        let err = store
            .append_turn(&id, &other, TurnRole::User, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ck_domain::error::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_turns() {
        let store = store().await;
        let c = caller("u1");
        let id = store.resolve_or_mint(&c, None).await.unwrap();
        store
            .append_turn(&id, &c, TurnRole::User, "hi", None)
            .await
            .unwrap();
        store.delete(&id, &c).await.unwrap();
        assert!(store.load(&id, &c).await.is_err());
        assert!(store.turns(&id).await.unwrap().is_empty());
    }
}
