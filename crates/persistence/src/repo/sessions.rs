use chrono::{DateTime, Utc};
use ck_domain::error::{Error, Result};
use ck_domain::model::{Caller, Session};
use uuid::Uuid;

use crate::scope::{scope_binds, scope_clause};
use crate::Db;

type SessionRow = (String, String, Option<String>, Option<String>, i64, String, String);

pub async fn create(db: &Db, owner: &Caller, title: Option<&str>) -> Result<Session> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, owner_id, title, summary, total_tokens, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, 0, ?4, ?4)",
    )
    .bind(&id)
    .bind(&owner.id)
    .bind(title)
    .bind(now.to_rfc3339())
    .execute(db.pool())
    .await?;

    Ok(Session {
        id,
        owner_id: owner.id.clone(),
        created_at: now,
        updated_at: now,
        title: title.map(str::to_string),
        total_tokens: 0,
        summary: None,
    })
}

pub async fn list(db: &Db, caller: &Caller) -> Result<Vec<Session>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("owner_id", "owner_id"); // sessions have no access_level; admins see only their own via owner match twice
    let sql = format!(
        "SELECT id, owner_id, title, summary, total_tokens, created_at, updated_at FROM sessions WHERE {clause} OR ?2 = 1 ORDER BY updated_at DESC"
    );
    let rows: Vec<SessionRow> = sqlx::query_as(&sql)
        .bind(&owner)
        .bind(is_admin)
        .fetch_all(db.pool())
        .await?;

    rows.into_iter().map(row_to_session).collect()
}

pub async fn get(db: &Db, caller: &Caller, id: &str) -> Result<Session> {
    let row = fetch_row(db, id).await?;
    let row = row.ok_or_else(|| Error::NotFound(format!("session {id}")))?;

    if row.1 != caller.id && !caller.is_admin {
        // A mismatch reads exactly like a missing row: no hint that a
        // session with this id exists under a different owner.
        return Err(Error::NotFound(format!("session {id}")));
    }

    row_to_session(row)
}

/// Look up a session by id, scoped to a specific owner, without surfacing
/// the distinction between "absent" and "owned by someone else". Used by
/// `resolve_or_mint` to decide whether an incoming session id is usable.
pub async fn get_owned_by(db: &Db, id: &str, owner_id: &str) -> Result<Option<Session>> {
    let Some(row) = fetch_row(db, id).await? else {
        return Ok(None);
    };
    if row.1 != owner_id {
        return Ok(None);
    }
    row_to_session(row).map(Some)
}

pub async fn touch(db: &Db, id: &str, added_tokens: u64) -> Result<()> {
    sqlx::query(
        "UPDATE sessions SET total_tokens = total_tokens + ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(id)
    .bind(added_tokens as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn set_summary(db: &Db, id: &str, summary: &str) -> Result<()> {
    sqlx::query("UPDATE sessions SET summary = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Delete a session and every turn belonging to it. Memories derived from
/// those turns are untouched.
pub async fn delete(db: &Db, caller: &Caller, id: &str) -> Result<()> {
    let row = fetch_row(db, id).await?;
    let row = row.ok_or_else(|| Error::NotFound(format!("session {id}")))?;
    if row.1 != caller.id && !caller.is_admin {
        return Err(Error::NotFound(format!("session {id}")));
    }

    let mut tx = db.pool().begin().await?;
    sqlx::query("DELETE FROM turns WHERE session_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

async fn fetch_row(db: &Db, id: &str) -> Result<Option<SessionRow>> {
    sqlx::query_as(
        "SELECT id, owner_id, title, summary, total_tokens, created_at, updated_at FROM sessions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(db.pool())
    .await
    .map_err(Error::from)
}

fn row_to_session(row: SessionRow) -> Result<Session> {
    let (id, owner_id, title, summary, total_tokens, created_at, updated_at) = row;
    Ok(Session {
        id,
        owner_id,
        title,
        summary,
        total_tokens: total_tokens as u64,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {s}: {e}")))
}
