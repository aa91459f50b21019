//! Import job queries

use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use crate::types::import::{ImportJob, ImportJobStatus};

const JOB_COLUMNS: &str = r#"
    id, file_name, uploader_id, status, total_count, success_count, failed_count,
    report_url, created_at, updated_at
"#;

pub async fn create_import_job(
    pool: &PgPool,
    file_name: &str,
    uploader_id: Option<Uuid>,
    total: i32,
) -> Result<ImportJob> {
    let query = format!(
        r#"
        INSERT INTO import_jobs (id, file_name, uploader_id, status, total_count, created_at, updated_at)
        VALUES ($1, $2, $3, 'PENDING', $4, NOW(), NOW())
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    let job = sqlx::query_as::<_, ImportJob>(&query)
        .bind(Uuid::new_v4())
        .bind(file_name)
        .bind(uploader_id)
        .bind(total)
        .fetch_one(pool)
        .await?;

    Ok(job)
}

pub async fn get_import_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ImportJob>> {
    let query = format!("SELECT {} FROM import_jobs WHERE id = $1", JOB_COLUMNS);
    let job = sqlx::query_as::<_, ImportJob>(&query)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(job)
}

pub async fn list_import_jobs(pool: &PgPool, limit: i64) -> Result<Vec<ImportJob>> {
    let query = format!(
        "SELECT {} FROM import_jobs ORDER BY created_at DESC LIMIT $1",
        JOB_COLUMNS
    );
    let jobs = sqlx::query_as::<_, ImportJob>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(jobs)
}

pub async fn mark_import_job_running(pool: &PgPool, job_id: Uuid, total: i32) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'RUNNING', total_count = $2, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(job_id)
    .bind(total)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_import_job_counts(pool: &PgPool, job_id: Uuid, success: i32, failed: i32) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET success_count = $2, failed_count = $3, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(job_id)
    .bind(success)
    .bind(failed)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a non-terminal job to its final status
pub async fn finish_import_job(
    pool: &PgPool,
    job_id: Uuid,
    status: ImportJobStatus,
    success: i32,
    failed: i32,
    report_url: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = $2, success_count = $3, failed_count = $4, report_url = $5, updated_at = NOW()
        WHERE id = $1 AND status IN ('PENDING', 'RUNNING')
        "#
    )
    .bind(job_id)
    .bind(status)
    .bind(success)
    .bind(failed)
    .bind(report_url)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_import_job(pool: &PgPool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM import_jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
