use chrono::{DateTime, Utc};
use ck_domain::error::{Error, Result};
use ck_domain::model::{Turn, TurnRole};
use uuid::Uuid;

use crate::Db;

fn role_str(r: TurnRole) -> &'static str {
    match r {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
        TurnRole::Tool => "tool",
        TurnRole::System => "system",
    }
}

fn parse_role(s: &str) -> Result<TurnRole> {
    Ok(match s {
        "user" => TurnRole::User,
        "assistant" => TurnRole::Assistant,
        "tool" => TurnRole::Tool,
        "system" => TurnRole::System,
        other => return Err(Error::Internal(format!("unknown turn role {other}"))),
    })
}

/// Append one turn to a session. Callers serialize concurrent appends to
/// the same session (per-session lock) before calling this; the insert
/// itself carries no session-level locking of its own.
pub async fn append(
    db: &Db,
    session_id: &str,
    owner_id: &str,
    role: TurnRole,
    content: &str,
    specialist: Option<&str>,
) -> Result<Turn> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO turns (id, session_id, owner_id, role, content, specialist, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&id)
    .bind(session_id)
    .bind(owner_id)
    .bind(role_str(role))
    .bind(content)
    .bind(specialist)
    .bind(now.to_rfc3339())
    .execute(db.pool())
    .await?;

    Ok(Turn {
        id,
        session_id: session_id.to_string(),
        owner_id: owner_id.to_string(),
        role,
        content: content.to_string(),
        created_at: now,
        specialist: specialist.map(str::to_string),
    })
}

/// List the turns of a session in chronological order. Isolation is the
/// caller's responsibility: this is only called after `sessions::get`/
/// `get_owned_by` has already confirmed ownership of `session_id`.
pub async fn list(db: &Db, session_id: &str) -> Result<Vec<Turn>> {
    let rows: Vec<(String, String, String, String, String, Option<String>, String)> =
        sqlx::query_as(
            "SELECT id, session_id, owner_id, role, content, specialist, created_at
             FROM turns WHERE session_id = ?1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(db.pool())
        .await?;

    rows.into_iter()
        .map(|(id, session_id, owner_id, role, content, specialist, created_at)| {
            Ok(Turn {
                id,
                session_id,
                owner_id,
                role: parse_role(&role)?,
                content,
                created_at: parse_ts(&created_at)?,
                specialist,
            })
        })
        .collect()
}

/// The most recent `limit` turns, oldest first — the window the
/// orchestrator folds into a prompt's recent-turns section.
pub async fn recent(db: &Db, session_id: &str, limit: i64) -> Result<Vec<Turn>> {
    let rows: Vec<(String, String, String, String, String, Option<String>, String)> =
        sqlx::query_as(
            "SELECT id, session_id, owner_id, role, content, specialist, created_at
             FROM turns WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(db.pool())
        .await?;

    let mut turns: Vec<Turn> = rows
        .into_iter()
        .map(|(id, session_id, owner_id, role, content, specialist, created_at)| {
            Ok(Turn {
                id,
                session_id,
                owner_id,
                role: parse_role(&role)?,
                content,
                created_at: parse_ts(&created_at)?,
                specialist,
            })
        })
        .collect::<Result<_>>()?;
    turns.reverse();
    Ok(turns)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {s}: {e}")))
}
