//! Product import entry points shared by the sync endpoint and the queue

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::services::audit::{self, AuditTrail};
use crate::services::field_mapper::{map_rows, resolve_mapping};
use crate::services::importer::{import_rows, CatalogStore, ImportContext};
use crate::services::report::write_error_report;
use crate::services::spreadsheet::{read_spreadsheet, SpreadsheetError};
use crate::services::storage::UploadStorage;
use crate::types::{
    entity, AuditAction, AuditEntry, DuplicateMode, ImportJob, ImportJobStatus, ImportOutcome,
    PreviewResponse, SuppliedMapping, SyncImportResponse,
};

/// Data rows returned by a preview
pub const PREVIEW_SAMPLE_ROWS: usize = 50;

/// Import job persistence
#[async_trait]
pub trait ImportJobStore: Send + Sync {
    async fn create_job(
        &self,
        file_name: &str,
        uploader_id: Option<Uuid>,
        total: i32,
    ) -> Result<ImportJob>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>>;

    /// Most recent jobs first
    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>>;

    async fn mark_running(&self, job_id: Uuid, total: i32) -> Result<()>;

    /// Persist running counters while a job is still in progress
    async fn update_counts(&self, job_id: Uuid, success: i32, failed: i32) -> Result<()>;

    /// Move a job to its terminal status. Terminal jobs are left untouched.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        success: i32,
        failed: i32,
        report_url: Option<&str>,
    ) -> Result<()>;

    async fn delete_job(&self, job_id: Uuid) -> Result<bool>;
}

/// Collaborators of the import pipeline
#[derive(Clone)]
pub struct ImportDeps {
    pub catalog: Arc<dyn CatalogStore>,
    pub jobs: Arc<dyn ImportJobStore>,
    pub audit: Arc<dyn AuditTrail>,
    pub storage: UploadStorage,
}

/// Caller choices attached to one upload
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub supplier_id: Option<Uuid>,
    pub mode: DuplicateMode,
    pub mapping: Option<SuppliedMapping>,
    pub actor_id: Option<Uuid>,
}

impl ImportOptions {
    pub fn context(&self) -> ImportContext {
        ImportContext {
            supplier_id: self.supplier_id,
            mode: self.mode,
            actor_id: self.actor_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub fn to_count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub fn import_summary(outcome: &ImportOutcome) -> String {
    format!(
        "导入产品: 成功 {}, 失败 {}, 跳过 {}, 更新 {}",
        outcome.success, outcome.failed, outcome.skipped, outcome.updated
    )
}

/// Parse and import a file within the request. The job ends SUCCESS when at
/// least one product was created, FAILED otherwise.
pub async fn import_sync(
    deps: &ImportDeps,
    file_name: &str,
    bytes: &[u8],
    options: &ImportOptions,
) -> Result<SyncImportResponse, ImportError> {
    let sheet = read_spreadsheet(bytes, file_name)?;
    let mapping = resolve_mapping(&sheet.headers, options.mapping.as_ref());
    let rows = map_rows(&sheet, &mapping);

    let job = deps
        .jobs
        .create_job(file_name, options.actor_id, to_count(rows.len()))
        .await?;
    deps.jobs.mark_running(job.id, to_count(rows.len())).await?;

    let outcome = import_rows(deps.catalog.as_ref(), &rows, &options.context()).await;

    let report = if outcome.errors.is_empty() {
        None
    } else {
        Some(write_error_report(&deps.storage, job.id, &outcome.errors).await?)
    };

    let status = if outcome.success > 0 {
        ImportJobStatus::Success
    } else {
        ImportJobStatus::Failed
    };
    deps.jobs
        .finish_job(
            job.id,
            status,
            to_count(outcome.success),
            to_count(outcome.failed),
            report.as_deref(),
        )
        .await?;

    audit::record(
        deps.audit.as_ref(),
        AuditEntry::new(options.actor_id, AuditAction::Import, entity::PRODUCT)
            .entity_id(job.id)
            .summary(import_summary(&outcome)),
    )
    .await;

    info!(
        job_id = %job.id,
        file = file_name,
        success = outcome.success,
        failed = outcome.failed,
        "Synchronous import finished"
    );

    Ok(SyncImportResponse {
        job_id: job.id,
        outcome,
    })
}

/// Dry-run parse: headers, suggested mapping and the first rows
pub fn preview(
    bytes: &[u8],
    file_name: &str,
    supplied: Option<&SuppliedMapping>,
) -> Result<PreviewResponse, SpreadsheetError> {
    let sheet = read_spreadsheet(bytes, file_name)?;
    let mapping = resolve_mapping(&sheet.headers, supplied);
    let sample = sheet
        .rows
        .iter()
        .take(PREVIEW_SAMPLE_ROWS)
        .map(|r| r.cells.clone())
        .collect();

    Ok(PreviewResponse {
        file_name: file_name.to_string(),
        total_rows: sheet.rows.len(),
        headers: sheet.headers,
        mapping,
        sample,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use crate::types::{ProductField, RowErrorCode};

    fn deps(store: &Arc<MemoryStore>, dir: &std::path::Path) -> ImportDeps {
        ImportDeps {
            catalog: store.clone(),
            jobs: store.clone(),
            audit: store.clone(),
            storage: UploadStorage::new(dir),
        }
    }

    const CSV: &str = "名称,规格,单价,数量\n螺丝,M4,1.5,10\n螺母,M4,,5\n垫片,M4,0.1,100\n";

    #[tokio::test]
    async fn test_import_sync_records_job_report_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let supplier = store.add_supplier("华东五金");
        let deps = deps(&store, dir.path());
        let options = ImportOptions {
            supplier_id: Some(supplier),
            ..Default::default()
        };

        let response = import_sync(&deps, "products.csv", CSV.as_bytes(), &options)
            .await
            .unwrap();

        assert_eq!(response.outcome.total, 3);
        assert_eq!(response.outcome.success, 2);
        assert_eq!(response.outcome.failed, 1);
        assert_eq!(response.outcome.errors[0].row, 3);
        assert_eq!(response.outcome.errors[0].code, RowErrorCode::Required);

        let job = store.job(response.job_id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Success);
        assert_eq!(job.total_count, 3);
        assert_eq!(job.success_count, 2);
        assert_eq!(job.failed_count, 1);
        let report = job.report_url.unwrap();
        assert!(deps.storage.exists(&report).await);

        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Import);
        assert_eq!(
            audit[0].summary.as_deref(),
            Some("导入产品: 成功 2, 失败 1, 跳过 0, 更新 0")
        );
    }

    #[tokio::test]
    async fn test_import_sync_without_successes_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let deps = deps(&store, dir.path());

        let response = import_sync(&deps, "products.csv", CSV.as_bytes(), &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!(response.outcome.success, 0);
        let job = store.job(response.job_id).unwrap();
        assert_eq!(job.status, ImportJobStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_file_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let deps = deps(&store, dir.path());

        let result = import_sync(&deps, "empty.csv", b"", &ImportOptions::default()).await;

        assert!(matches!(result, Err(ImportError::Spreadsheet(_))));
        assert_eq!(store.job_count(), 0);
    }

    #[test]
    fn test_preview_returns_headers_mapping_and_sample() {
        let mut csv = String::from("产品导入模板\n名称,规格,单价,备注\n");
        for i in 0..60 {
            csv.push_str(&format!("螺丝{i},M4,1,\n"));
        }

        let preview = preview(csv.as_bytes(), "big.csv", None).unwrap();

        assert_eq!(preview.total_rows, 60);
        assert_eq!(preview.sample.len(), PREVIEW_SAMPLE_ROWS);
        assert_eq!(preview.headers.len(), 4);
        assert_eq!(preview.mapping.get("备注"), Some(&ProductField::Note));
    }
}
