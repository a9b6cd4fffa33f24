//! Reciprocal Rank Fusion for combining dense and lexical retrieval lists.

use std::collections::HashMap;

use ck_domain::model::Chunk;

pub const DEFAULT_RRF_C: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
    /// Raw dense cosine similarity, kept only to break RRF ties.
    pub dense_score: f64,
}

/// Merge a dense-ranked list and a lexical-ranked list via RRF:
/// `score(d) = sum over lists containing d of 1 / (c + rank)`.
/// Ties are broken by the higher raw dense cosine score, extending the
/// insertion-order tiebreak with an explicit, deterministic signal.
pub fn rrf_merge(
    dense: &[(Chunk, f64)],
    lexical: &[Chunk],
    c: f64,
) -> Vec<ScoredChunk> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut dense_scores: HashMap<String, f64> = HashMap::new();
    let mut chunks: HashMap<String, Chunk> = HashMap::new();

    for (rank, (chunk, dense_score)) in dense.iter().enumerate() {
        *scores.entry(chunk.id.clone()).or_insert(0.0) += 1.0 / (c + rank as f64 + 1.0);
        dense_scores.insert(chunk.id.clone(), *dense_score);
        chunks.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }

    for (rank, chunk) in lexical.iter().enumerate() {
        *scores.entry(chunk.id.clone()).or_insert(0.0) += 1.0 / (c + rank as f64 + 1.0);
        chunks.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }

    let mut merged: Vec<ScoredChunk> = scores
        .into_iter()
        .map(|(id, score)| ScoredChunk {
            chunk: chunks.remove(&id).expect("chunk present"),
            score,
            dense_score: *dense_scores.get(&id).unwrap_or(&0.0),
        })
        .collect();

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then(b.dense_score.partial_cmp(&a.dense_score).unwrap())
    });

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_domain::model::AccessLevel;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".into(),
            owner_id: "u".into(),
            access_level: AccessLevel::Private,
            ordinal: 0,
            text: id.to_string(),
            embedding: None,
        }
    }

    #[test]
    fn item_in_both_lists_outranks_single_list_item() {
        let dense = vec![(chunk("a"), 0.9), (chunk("b"), 0.5)];
        let lexical = vec![chunk("b"), chunk("c")];
        let merged = rrf_merge(&dense, &lexical, DEFAULT_RRF_C);
        assert_eq!(merged[0].chunk.id, "b");
    }

    #[test]
    fn tie_broken_by_dense_score() {
        let dense = vec![(chunk("a"), 0.9), (chunk("b"), 0.1)];
        let lexical = vec![chunk("b"), chunk("a")];
        let merged = rrf_merge(&dense, &lexical, DEFAULT_RRF_C);
        // Both have identical RRF scores (rank 0 + rank 1 in each list); "a"
        // wins on raw dense similarity.
        assert_eq!(merged[0].chunk.id, "a");
    }
}
