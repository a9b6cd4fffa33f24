use ck_domain::error::Result;
use ck_domain::model::{AccessLevel, Caller, Chunk};
use uuid::Uuid;

use crate::scope::{scope_binds, scope_clause};
use crate::Db;

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub async fn insert(
    db: &Db,
    owner: &Caller,
    document_id: &str,
    access: AccessLevel,
    ordinal: u32,
    text: &str,
    embedding: &[f32],
) -> Result<Chunk> {
    let id = Uuid::new_v4().to_string();
    let access_str = match access {
        AccessLevel::Private => "private",
        AccessLevel::SharedWithAdmins => "shared_with_admins",
    };
    sqlx::query(
        "INSERT INTO chunks (id, document_id, owner_id, access_level, ordinal, text, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&id)
    .bind(document_id)
    .bind(&owner.id)
    .bind(access_str)
    .bind(ordinal as i64)
    .bind(text)
    .bind(encode_embedding(embedding))
    .execute(db.pool())
    .await?;

    Ok(Chunk {
        id,
        document_id: document_id.to_string(),
        owner_id: owner.id.clone(),
        access_level: access,
        ordinal,
        text: text.to_string(),
        embedding: Some(embedding.to_vec()),
    })
}

/// Every chunk visible to `caller`, for the brute-force dense scan. There is
/// no native ANN index available in embedded SQLite, so the Knowledge Index
/// scores all of them in memory; this is the documented tradeoff for the
/// corpus sizes this service targets.
pub async fn scan_visible(db: &Db, caller: &Caller) -> Result<Vec<Chunk>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("owner_id", "access_level");
    let sql = format!(
        "SELECT id, document_id, owner_id, access_level, ordinal, text, embedding
         FROM chunks WHERE {clause}"
    );
    let rows: Vec<(String, String, String, String, i64, String, Option<Vec<u8>>)> =
        sqlx::query_as(&sql)
            .bind(&owner)
            .bind(is_admin)
            .fetch_all(db.pool())
            .await?;

    Ok(rows
        .into_iter()
        .map(|(id, document_id, owner_id, access, ordinal, text, embedding)| Chunk {
            id,
            document_id,
            owner_id,
            access_level: if access == "shared_with_admins" {
                AccessLevel::SharedWithAdmins
            } else {
                AccessLevel::Private
            },
            ordinal: ordinal as u32,
            text,
            embedding: embedding.map(|b| decode_embedding(&b)),
        })
        .collect())
}

/// Lexical candidates via FTS5 BM25 ranking, restricted to rows visible to
/// `caller` by joining back onto `chunks` and applying the same scope clause.
pub async fn fts_search(db: &Db, caller: &Caller, query: &str, limit: i64) -> Result<Vec<(Chunk, f64)>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("c.owner_id", "c.access_level");
    let sql = format!(
        "SELECT c.id, c.document_id, c.owner_id, c.access_level, c.ordinal, c.text, c.embedding, bm25(chunks_fts) as rank
         FROM chunks_fts
         JOIN chunks c ON c.rowid = chunks_fts.rowid
         WHERE chunks_fts MATCH ?3 AND {clause}
         ORDER BY rank LIMIT ?4"
    );
    let rows: Vec<(String, String, String, String, i64, String, Option<Vec<u8>>, f64)> =
        sqlx::query_as(&sql)
            .bind(&owner)
            .bind(is_admin)
            .bind(query)
            .bind(limit)
            .fetch_all(db.pool())
            .await?;

    Ok(rows
        .into_iter()
        .map(|(id, document_id, owner_id, access, ordinal, text, embedding, rank)| {
            (
                Chunk {
                    id,
                    document_id,
                    owner_id,
                    access_level: if access == "shared_with_admins" {
                        AccessLevel::SharedWithAdmins
                    } else {
                        AccessLevel::Private
                    },
                    ordinal: ordinal as u32,
                    text,
                    embedding: embedding.map(|b| decode_embedding(&b)),
                },
                rank,
            )
        })
        .collect())
}
