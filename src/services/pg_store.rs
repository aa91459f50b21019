//! Postgres-backed implementations of the service seams

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::services::audit::AuditTrail;
use crate::services::import_pipeline::ImportJobStore;
use crate::services::importer::{CatalogStore, ExistingProduct, PriceChange, ValidatedRow};
use crate::types::{AuditEntry, ImportJob, ImportJobStatus};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn supplier_exists(&self, supplier_id: Uuid) -> Result<bool> {
        queries::supplier::supplier_exists(&self.pool, supplier_id).await
    }

    async fn find_supplier_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        queries::supplier::find_supplier_id_by_name(&self.pool, name).await
    }

    async fn find_product(
        &self,
        supplier_id: Uuid,
        name: &str,
        spec: &str,
    ) -> Result<Option<ExistingProduct>> {
        queries::product::find_product_by_key(&self.pool, supplier_id, name, spec).await
    }

    async fn create_imported_product(&self, row: &ValidatedRow) -> Result<Uuid> {
        queries::product::create_imported_product(&self.pool, row).await
    }

    async fn update_imported_product(
        &self,
        product_id: Uuid,
        row: &ValidatedRow,
        price_change: Option<PriceChange>,
    ) -> Result<()> {
        queries::product::update_imported_product(&self.pool, product_id, row, price_change).await
    }
}

#[async_trait]
impl ImportJobStore for PgStore {
    async fn create_job(
        &self,
        file_name: &str,
        uploader_id: Option<Uuid>,
        total: i32,
    ) -> Result<ImportJob> {
        queries::import_job::create_import_job(&self.pool, file_name, uploader_id, total).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>> {
        queries::import_job::get_import_job(&self.pool, job_id).await
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>> {
        queries::import_job::list_import_jobs(&self.pool, limit).await
    }

    async fn mark_running(&self, job_id: Uuid, total: i32) -> Result<()> {
        queries::import_job::mark_import_job_running(&self.pool, job_id, total).await
    }

    async fn update_counts(&self, job_id: Uuid, success: i32, failed: i32) -> Result<()> {
        queries::import_job::update_import_job_counts(&self.pool, job_id, success, failed).await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        success: i32,
        failed: i32,
        report_url: Option<&str>,
    ) -> Result<()> {
        queries::import_job::finish_import_job(&self.pool, job_id, status, success, failed, report_url)
            .await
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        queries::import_job::delete_import_job(&self.pool, job_id).await
    }
}

#[async_trait]
impl AuditTrail for PgStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        queries::audit::insert_audit_log(&self.pool, &entry).await
    }
}
