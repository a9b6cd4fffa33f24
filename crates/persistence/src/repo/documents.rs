use chrono::Utc;
use ck_domain::error::{Error, Result};
use ck_domain::model::{AccessLevel, Caller, Document, DocumentStatus};
use uuid::Uuid;

use crate::scope::{scope_binds, scope_clause};
use crate::Db;

fn status_str(s: DocumentStatus) -> &'static str {
    match s {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Ingesting => "ingesting",
        DocumentStatus::Ready => "ready",
        DocumentStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> DocumentStatus {
    match s {
        "ingesting" => DocumentStatus::Ingesting,
        "ready" => DocumentStatus::Ready,
        "failed" => DocumentStatus::Failed,
        _ => DocumentStatus::Pending,
    }
}

pub async fn create(db: &Db, owner: &Caller, title: &str, access: AccessLevel) -> Result<Document> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let access_str = match access {
        AccessLevel::Private => "private",
        AccessLevel::SharedWithAdmins => "shared_with_admins",
    };
    sqlx::query(
        "INSERT INTO documents (id, owner_id, title, access_level, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
    )
    .bind(&id)
    .bind(&owner.id)
    .bind(title)
    .bind(access_str)
    .bind(now.to_rfc3339())
    .execute(db.pool())
    .await?;

    Ok(Document {
        id,
        owner_id: owner.id.clone(),
        title: title.to_string(),
        access_level: access,
        status: DocumentStatus::Pending,
        created_at: now,
    })
}

pub async fn set_status(db: &Db, id: &str, status: DocumentStatus) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?2 WHERE id = ?1")
        .bind(id)
        .bind(status_str(status))
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn list(db: &Db, caller: &Caller) -> Result<Vec<Document>> {
    let (owner, is_admin) = scope_binds(caller);
    let clause = scope_clause("owner_id", "access_level");
    let sql = format!(
        "SELECT id, owner_id, title, access_level, status, created_at FROM documents
         WHERE {clause} ORDER BY created_at DESC"
    );
    let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(&sql)
        .bind(&owner)
        .bind(is_admin)
        .fetch_all(db.pool())
        .await?;

    rows.into_iter()
        .map(|(id, owner_id, title, access, status, created_at)| {
            Ok(Document {
                id,
                owner_id,
                title,
                access_level: if access == "shared_with_admins" {
                    AccessLevel::SharedWithAdmins
                } else {
                    AccessLevel::Private
                },
                status: parse_status(&status),
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|e| Error::Internal(e.to_string()))?,
            })
        })
        .collect()
}
