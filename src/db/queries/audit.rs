//! Audit log queries

use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use crate::types::audit::AuditEntry;

pub async fn insert_audit_log(pool: &PgPool, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, entity, entity_id, summary, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.action.as_str())
    .bind(entry.entity)
    .bind(&entry.entity_id)
    .bind(&entry.summary)
    .execute(pool)
    .await?;

    Ok(())
}
