use chrono::Utc;
use ck_domain::error::{Error, Result};
use ck_domain::model::{AccessLevel, Caller, Memory, MemoryKind};
use uuid::Uuid;

use crate::scope::{scope_binds, scope_clause};
use crate::Db;

fn kind_str(k: MemoryKind) -> &'static str {
    match k {
        MemoryKind::Identity => "identity",
        MemoryKind::EmotionalState => "emotional_state",
        MemoryKind::Preference => "preference",
        MemoryKind::Goal => "goal",
        MemoryKind::Pattern => "pattern",
    }
}

fn parse_kind(s: &str) -> Result<MemoryKind> {
    Ok(match s {
        "identity" => MemoryKind::Identity,
        "emotional_state" => MemoryKind::EmotionalState,
        "preference" => MemoryKind::Preference,
        "goal" => MemoryKind::Goal,
        "pattern" => MemoryKind::Pattern,
        other => return Err(Error::Internal(format!("unknown memory kind {other}"))),
    })
}

/// Idempotent derivation: relies on the `(owner_id, source_turn_id)` unique
/// constraint, so deriving from the same turn twice is a no-op, not a
/// duplicate row.
pub async fn derive(
    db: &Db,
    owner_id: &str,
    source_turn_id: &str,
    kind: MemoryKind,
    content: &str,
) -> Result<Memory> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let inserted = sqlx::query(
        "INSERT INTO memories (id, owner_id, source_turn_id, kind, content, access_level, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'private', ?6)
         ON CONFLICT(owner_id, source_turn_id) DO NOTHING",
    )
    .bind(&id)
    .bind(owner_id)
    .bind(source_turn_id)
    .bind(kind_str(kind))
    .bind(content)
    .bind(now.to_rfc3339())
    .execute(db.pool())
    .await?;

    if inserted.rows_affected() == 0 {
        let row: (String, String, String, String, String, String) = sqlx::query_as(
            "SELECT id, owner_id, kind, content, access_level, created_at FROM memories
             WHERE owner_id = ?1 AND source_turn_id = ?2",
        )
        .bind(owner_id)
        .bind(source_turn_id)
        .fetch_one(db.pool())
        .await?;
        return Ok(Memory {
            id: row.0,
            owner_id: row.1,
            source_turn_id: source_turn_id.to_string(),
            kind: parse_kind(&row.2)?,
            content: row.3,
            access_level: AccessLevel::Private,
            created_at: now,
        });
    }

    Ok(Memory {
        id,
        owner_id: owner_id.to_string(),
        source_turn_id: source_turn_id.to_string(),
        kind,
        content: content.to_string(),
        access_level: AccessLevel::Private,
        created_at: now,
    })
}

pub async fn search(db: &Db, caller: &Caller, query: &str, limit: i64) -> Result<Vec<Memory>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("owner_id", "access_level");
    let sql = format!(
        "SELECT id, owner_id, source_turn_id, kind, content, access_level, created_at
         FROM memories WHERE {clause} AND content LIKE '%' || ?3 || '%'
         ORDER BY created_at DESC LIMIT ?4"
    );
    let rows: Vec<(String, String, String, String, String, String, String)> =
        sqlx::query_as(&sql)
            .bind(&owner)
            .bind(is_admin)
            .bind(query)
            .bind(limit)
            .fetch_all(db.pool())
            .await?;

    rows.into_iter()
        .map(|(id, owner_id, source_turn_id, kind, content, access, created_at)| {
            Ok(Memory {
                id,
                owner_id,
                source_turn_id,
                kind: parse_kind(&kind)?,
                content,
                access_level: if access == "shared_with_admins" {
                    AccessLevel::SharedWithAdmins
                } else {
                    AccessLevel::Private
                },
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|e| Error::Internal(e.to_string()))?,
            })
        })
        .collect()
}

/// All memories visible to `caller`, most recent first. Unlike `search`,
/// there is no content filter — this backs the paginated `list` surface.
pub async fn list(db: &Db, caller: &Caller) -> Result<Vec<Memory>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("owner_id", "access_level");
    let sql = format!(
        "SELECT id, owner_id, source_turn_id, kind, content, access_level, created_at
         FROM memories WHERE {clause} ORDER BY created_at DESC"
    );
    let rows: Vec<(String, String, String, String, String, String, String)> =
        sqlx::query_as(&sql)
            .bind(&owner)
            .bind(is_admin)
            .fetch_all(db.pool())
            .await?;

    rows.into_iter()
        .map(|(id, owner_id, source_turn_id, kind, content, access, created_at)| {
            Ok(Memory {
                id,
                owner_id,
                source_turn_id,
                kind: parse_kind(&kind)?,
                content,
                access_level: if access == "shared_with_admins" {
                    AccessLevel::SharedWithAdmins
                } else {
                    AccessLevel::Private
                },
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|e| Error::Internal(e.to_string()))?,
            })
        })
        .collect()
}

pub async fn delete(db: &Db, caller: &Caller, id: &str) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT owner_id FROM memories WHERE id = ?1")
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    let (owner_id,) = row.ok_or_else(|| Error::NotFound(format!("memory {id}")))?;
    if owner_id != caller.id && !caller.is_admin {
        return Err(Error::Ownership);
    }
    sqlx::query("DELETE FROM memories WHERE id = ?1")
        .bind(id)
        .execute(db.pool())
        .await?;
    Ok(())
}
