//! `UserFactsBuilder` — queries the Memory Store for a caller's derived
//! facts and formats them as a compact Markdown string suitable for
//! injection into the system prompt's `USER_FACTS` section.
//!
//! Gracefully degrades: if the Memory Store query fails, the builder
//! returns an empty string rather than propagating the failure — a prompt
//! missing user facts is better than a turn that can't start.

use ck_domain::model::{Caller, MemoryKind};
use tracing::warn;

use crate::store::MemoryStore;

fn heading(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Identity => "Identity",
        MemoryKind::EmotionalState => "Emotional State",
        MemoryKind::Preference => "Preferences",
        MemoryKind::Goal => "Goals",
        MemoryKind::Pattern => "Patterns",
    }
}

/// Builds the `USER_FACTS` section injected into the context pack.
pub struct UserFactsBuilder<'a> {
    store: &'a MemoryStore,
    caller: Caller,
    max_chars: usize,
    search_queries: Vec<String>,
}

impl<'a> UserFactsBuilder<'a> {
    pub fn new(store: &'a MemoryStore, caller: Caller, max_chars: usize) -> Self {
        Self {
            store,
            caller,
            max_chars,
            search_queries: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_queries.push(query.into());
        self
    }

    pub fn with_queries(mut self, queries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.search_queries.extend(queries.into_iter().map(Into::into));
        self
    }

    /// Fetch matching memories and assemble the USER_FACTS string. Never
    /// fails — returns an empty string on error.
    pub async fn build(&self) -> String {
        let mut by_kind: std::collections::BTreeMap<&'static str, Vec<String>> =
            std::collections::BTreeMap::new();

        let queries = if self.search_queries.is_empty() {
            vec![String::new()]
        } else {
            self.search_queries.clone()
        };

        for query in &queries {
            match self.store.search(&self.caller, query, 20).await {
                Ok(memories) => {
                    for mem in memories {
                        by_kind.entry(heading(mem.kind)).or_default().push(mem.content);
                    }
                }
                Err(e) => {
                    warn!(caller = %self.caller.id, query = %query, error = %e, "memory search failed for user facts");
                }
            }
        }

        for facts in by_kind.values_mut() {
            facts.sort();
            facts.dedup();
        }

        self.assemble_markdown(&by_kind)
    }

    fn assemble_markdown(&self, by_kind: &std::collections::BTreeMap<&'static str, Vec<String>>) -> String {
        if by_kind.is_empty() {
            return String::new();
        }

        let mut output = String::new();
        for (heading, facts) in by_kind {
            if facts.is_empty() {
                continue;
            }
            let body = facts.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
            let section_block = format!("### {heading}\n{body}\n\n");

            if output.len() + section_block.len() > self.max_chars {
                let remaining = self.max_chars.saturating_sub(output.len());
                if remaining > 30 {
                    let cut = section_block
                        .char_indices()
                        .take_while(|(i, _)| *i < remaining.saturating_sub(25))
                        .last()
                        .map(|(i, c)| i + c.len_utf8())
                        .unwrap_or(0);
                    output.push_str(&section_block[..cut]);
                    output.push_str("\n[USER_FACTS_TRUNCATED]\n");
                } else {
                    output.push_str("[USER_FACTS_TRUNCATED]\n");
                }
                return output;
            }

            output.push_str(&section_block);
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_yields_empty_string() {
        let db = std::sync::Arc::new(ck_persistence::Db::open_in_memory().await.unwrap());
        let store = MemoryStore::new(db);
        let caller = Caller::anonymous("u1");
        let builder = UserFactsBuilder::new(&store, caller, 2000);
        assert_eq!(builder.build().await, "");
    }

    #[tokio::test]
    async fn derived_memory_appears_in_output() {
        let db = std::sync::Arc::new(ck_persistence::Db::open_in_memory().await.unwrap());
        let store = MemoryStore::new(db);
        store
            .derive("u1", "turn-1", MemoryKind::Preference, "prefers dark mode")
            .await
            .unwrap();
        let caller = Caller::anonymous("u1");
        let builder = UserFactsBuilder::new(&store, caller, 2000);
        let out = builder.build().await;
        assert!(out.contains("Preferences"));
        assert!(out.contains("prefers dark mode"));
    }
}
