use std::sync::Arc;

use ck_domain::capability::ModelRole;
use ck_domain::error::Result;
use ck_domain::model::{Caller, Memory, MemoryKind, TurnRole};
use ck_persistence::repo::memories;
use ck_persistence::Db;
use ck_providers::router::LlmRouter;
use ck_providers::traits::ChatRequest;
use ck_sessions::store::SessionStore;

/// The five extraction families a turn can be derived into.
pub const EXTRACTABLE_KINDS: [MemoryKind; 5] = [
    MemoryKind::Identity,
    MemoryKind::EmotionalState,
    MemoryKind::Preference,
    MemoryKind::Goal,
    MemoryKind::Pattern,
];

/// A session whose `total_tokens` exceeds this is a summarization
/// candidate. Well under the smallest configured context window, so the
/// prompt builder never has to truncate a summary it just produced.
const SUMMARIZE_TOKEN_CEILING: u64 = 6000;

/// How many of the most recent turns stay raw; everything older is folded
/// into the condensed summary.
const KEEP_LAST_TURNS: usize = 8;

/// A page of a caller's memories, most recently derived first.
pub struct MemoryPage {
    pub memories: Vec<Memory>,
    pub next_cursor: Option<String>,
}

pub struct MemoryStore {
    db: Arc<Db>,
}

impl MemoryStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Derive one memory from a turn. Safe to call more than once for the
    /// same `(owner_id, source_turn_id)`: the unique constraint on that pair
    /// makes the second call a no-op that returns the existing row.
    pub async fn derive(
        &self,
        owner_id: &str,
        source_turn_id: &str,
        kind: MemoryKind,
        content: &str,
    ) -> Result<Memory> {
        memories::derive(&self.db, owner_id, source_turn_id, kind, content).await
    }

    pub async fn search(&self, caller: &Caller, query: &str, limit: i64) -> Result<Vec<Memory>> {
        memories::search(&self.db, caller, query, limit).await
    }

    /// All memories visible to `caller`, paginated by id cursor the same way
    /// `SessionStore::list_for` paginates sessions.
    pub async fn list(
        &self,
        caller: &Caller,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MemoryPage> {
        let all = memories::list(&self.db, caller).await?;
        let start = match cursor {
            Some(c) => all.iter().position(|m| m.id == c).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };
        let page: Vec<Memory> = all.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + page.len() < all.len() {
            page.last().map(|m| m.id.clone())
        } else {
            None
        };
        Ok(MemoryPage {
            memories: page,
            next_cursor,
        })
    }

    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        memories::delete(&self.db, caller, id).await
    }

    /// Compress the oldest portion of a session's turns into a condensed
    /// summary once it crosses [`SUMMARIZE_TOKEN_CEILING`], leaving the most
    /// recent [`KEEP_LAST_TURNS`] raw. Raw turns are never rewritten — only
    /// the session's `summary` column is updated — and the prompt builder
    /// prefers that summary over the turns it replaces once one exists.
    ///
    /// Returns `None` when the session is under the ceiling or has too few
    /// turns to compress.
    pub async fn summarize_if_needed(
        &self,
        sessions: &SessionStore,
        llm: &LlmRouter,
        session_id: &str,
        caller: &Caller,
    ) -> Result<Option<String>> {
        let session = sessions.load(session_id, caller).await?;
        if session.total_tokens < SUMMARIZE_TOKEN_CEILING {
            return Ok(None);
        }

        let turns = sessions.turns(session_id).await?;
        if turns.len() <= KEEP_LAST_TURNS {
            return Ok(None);
        }
        let to_compact = &turns[..turns.len() - KEEP_LAST_TURNS];

        let conversation = to_compact
            .iter()
            .map(|t| format!("{}: {}", role_label(t.role), t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prior = session.summary.as_deref().unwrap_or("");
        let prompt = format!(
            "Summarize the following conversation turns into a concise paragraph \
             that preserves the user's stated goals, preferences, and any \
             decisions made. Fold in the prior summary rather than discarding it.\n\n\
             PRIOR SUMMARY:\n{prior}\n\nNEW TURNS:\n{conversation}"
        );

        let req = ChatRequest {
            messages: vec![ck_domain::tool::Message::user(&prompt)],
            temperature: Some(0.1),
            max_tokens: Some(512),
            ..Default::default()
        };
        let resp = llm.chat_for_role(ModelRole::Summarizer, req).await?;

        sessions.set_summary(session_id, &resp.content).await?;
        Ok(Some(resp.content))
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
