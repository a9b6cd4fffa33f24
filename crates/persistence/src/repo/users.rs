use ck_domain::error::Result;
use ck_domain::model::Caller;
use chrono::Utc;

use crate::Db;

pub async fn upsert(db: &Db, caller: &Caller, token_digest: Option<&str>) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, is_admin, token_digest, display_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            is_admin = ?2,
            token_digest = COALESCE(?3, token_digest),
            display_name = COALESCE(?4, display_name)",
    )
    .bind(&caller.id)
    .bind(caller.is_admin)
    .bind(token_digest)
    .bind(&caller.display_name)
    .bind(Utc::now().to_rfc3339())
    .execute(db.pool())
    .await?;
    Ok(())
}

/// All (token_digest, caller) pairs with a non-null token, used to refresh
/// the Identity Resolver's in-memory cache.
pub async fn all_with_tokens(db: &Db) -> Result<Vec<(String, Caller)>> {
    let rows: Vec<(String, String, bool, Option<String>)> = sqlx::query_as(
        "SELECT token_digest, id, is_admin, display_name FROM users WHERE token_digest IS NOT NULL",
    )
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(digest, id, is_admin, display_name)| {
            (
                digest,
                Caller {
                    id,
                    is_admin,
                    display_name,
                },
            )
        })
        .collect())
}
