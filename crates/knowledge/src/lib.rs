pub mod chunking;
pub mod embedder;
pub mod fusion;

use std::sync::Arc;

use ck_domain::error::Result;
use ck_domain::model::{AccessLevel, Caller, Document, DocumentStatus};
use ck_persistence::repo::{chunks, documents};
use ck_persistence::Db;
use ck_providers::classifier::cosine_similarity;

use embedder::Embedder;
use fusion::{rrf_merge, ScoredChunk, DEFAULT_RRF_C};

/// Hybrid (dense + lexical) retrieval over chunked documents, fused via
/// Reciprocal Rank Fusion.
pub struct KnowledgeIndex {
    db: Arc<Db>,
    embedder: Arc<Embedder>,
    rrf_c: f64,
    /// How many candidates each arm (dense, lexical) contributes before
    /// fusion narrows down to the caller's requested top-k.
    expansion_factor: usize,
}

impl KnowledgeIndex {
    pub fn new(db: Arc<Db>, embedder: Arc<Embedder>, rrf_c: f64, expansion_factor: usize) -> Self {
        Self {
            db,
            embedder,
            rrf_c,
            expansion_factor,
        }
    }

    /// Ingest a document: persist the row, then chunk, embed, and index the
    /// body in the background so the call returns immediately with the
    /// document in `Pending`/`Ingesting` status.
    pub async fn ingest(
        &self,
        owner: &Caller,
        title: &str,
        body: &str,
        access: AccessLevel,
    ) -> Result<Document> {
        let doc = documents::create(&self.db, owner, title, access).await?;

        let db = self.db.clone();
        let embedder = self.embedder.clone();
        let owner = owner.clone();
        let doc_id = doc.id.clone();
        let body = body.to_string();

        tokio::spawn(async move {
            if let Err(e) =
                ingest_body(&db, &embedder, &owner, &doc_id, &body, access).await
            {
                tracing::warn!(document_id = %doc_id, error = %e, "document ingestion failed");
                let _ = documents::set_status(&db, &doc_id, DocumentStatus::Failed).await;
            }
        });

        Ok(doc)
    }

    pub async fn list_documents(&self, caller: &Caller) -> Result<Vec<Document>> {
        documents::list(&self.db, caller).await
    }

    /// Dense + lexical hybrid search, fused via RRF, truncated to `k`.
    ///
    /// Each arm degrades independently: an embedding-backend error drops the
    /// dense generator and returns lexical-only results; an FTS error drops
    /// the lexical generator and returns dense-only. If both arms fail,
    /// retrieval returns empty rather than blocking the turn — stale or
    /// cross-user context is never substituted in its place.
    pub async fn search(&self, caller: &Caller, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let candidates = (k * self.expansion_factor).max(k);

        let dense = match self.dense_candidates(caller, query, candidates).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "dense retrieval failed, degrading to lexical-only");
                Vec::new()
            }
        };

        let lexical = match chunks::fts_search(&self.db, caller, query, candidates as i64).await {
            Ok(scored) => scored.into_iter().map(|(c, _)| c).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "lexical retrieval failed, degrading to dense-only");
                Vec::new()
            }
        };

        let mut merged = rrf_merge(&dense, &lexical, self.rrf_c);
        merged.truncate(k);
        Ok(merged)
    }

    async fn dense_candidates(
        &self,
        caller: &Caller,
        query: &str,
        candidates: usize,
    ) -> Result<Vec<(ck_domain::model::Chunk, f64)>> {
        let query_embedding = self.embedder.embed(query).await?;
        let all_chunks = chunks::scan_visible(&self.db, caller).await?;

        let mut dense: Vec<(ck_domain::model::Chunk, f64)> = all_chunks
            .into_iter()
            .filter_map(|c| {
                let emb = c.embedding.as_ref()?;
                let score = cosine_similarity(&query_embedding, emb) as f64;
                Some((c, score))
            })
            .collect();
        dense.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        dense.truncate(candidates);
        Ok(dense)
    }
}

async fn ingest_body(
    db: &Db,
    embedder: &Embedder,
    owner: &Caller,
    doc_id: &str,
    body: &str,
    access: AccessLevel,
) -> Result<()> {
    documents::set_status(db, doc_id, DocumentStatus::Ingesting).await?;

    for (ordinal, text) in chunking::chunk_text(body).into_iter().enumerate() {
        let embedding = embedder.embed(&text).await?;
        chunks::insert(db, owner, doc_id, access, ordinal as u32, &text, &embedding).await?;
    }

    documents::set_status(db, doc_id, DocumentStatus::Ready).await?;
    Ok(())
}

pub const DEFAULT_RRF: f64 = DEFAULT_RRF_C;

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(id: &str) -> Caller {
        Caller::anonymous(id)
    }

    #[tokio::test]
    async fn dense_failure_degrades_to_lexical_only() {
        let db = Arc::new(Db::open_in_memory().await.unwrap());
        // Unroutable endpoint: every embed() call fails, forcing the dense
        // arm to degrade rather than propagate.
        let embedder = Arc::new(Embedder::new("http://127.0.0.1:1", "test-model"));
        let index = KnowledgeIndex::new(db.clone(), embedder, DEFAULT_RRF, 3);

        let owner = caller("u1");
        let doc = documents::create(&db, &owner, "notes.txt", AccessLevel::Private)
            .await
            .unwrap();
        chunks::insert(&db, &owner, &doc.id, AccessLevel::Private, 0, "hello world", &[])
            .await
            .unwrap();

        let results = index.search(&owner, "hello", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "hello world");
    }

    #[tokio::test]
    async fn no_documents_returns_empty_without_error() {
        let db = Arc::new(Db::open_in_memory().await.unwrap());
        let embedder = Arc::new(Embedder::new("http://127.0.0.1:1", "test-model"));
        let index = KnowledgeIndex::new(db, embedder, DEFAULT_RRF, 3);

        let results = index.search(&caller("u1"), "anything", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
