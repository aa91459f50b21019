//! In-memory catalog, job and audit store for service tests

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::services::audit::AuditTrail;
use crate::services::import_pipeline::ImportJobStore;
use crate::services::importer::{CatalogStore, ExistingProduct, PriceChange, ValidatedRow};
use crate::types::{AuditEntry, ImportJob, ImportJobStatus, DEFAULT_PRODUCT_IMAGE_URL};

#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub spec: String,
    pub price: Decimal,
    pub lead_days: i32,
    pub quantity: i32,
    pub description: Option<String>,
    pub note: Option<String>,
    pub barcode: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StoredPriceChange {
    pub product_id: Uuid,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub changed_by: String,
}

type CreatedHook = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
struct State {
    suppliers: HashMap<Uuid, String>,
    products: Vec<StoredProduct>,
    price_history: Vec<StoredPriceChange>,
    jobs: Vec<ImportJob>,
    audit: Vec<AuditEntry>,
    failing_names: Vec<String>,
    fail_job_creation: bool,
    created: Vec<String>,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    on_created: Mutex<Option<CreatedHook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_supplier(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().suppliers.insert(id, name.to_string());
        id
    }

    pub fn add_product(&self, supplier_id: Uuid, name: &str, spec: &str, price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().products.push(StoredProduct {
            id,
            supplier_id,
            name: name.to_string(),
            spec: spec.to_string(),
            price,
            lead_days: 0,
            quantity: 1,
            description: None,
            note: None,
            barcode: None,
            images: vec![DEFAULT_PRODUCT_IMAGE_URL.to_string()],
        });
        id
    }

    pub fn product(&self, supplier_id: Uuid, name: &str, spec: &str) -> Option<StoredProduct> {
        self.state
            .lock()
            .products
            .iter()
            .find(|p| p.supplier_id == supplier_id && p.name == name && p.spec == spec)
            .cloned()
    }

    pub fn product_count(&self) -> usize {
        self.state.lock().products.len()
    }

    /// Product names in creation order, seeded products excluded
    pub fn created_names(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// Number of create and update calls that reached the store
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn price_history(&self, product_id: Uuid) -> Vec<StoredPriceChange> {
        self.state
            .lock()
            .price_history
            .iter()
            .filter(|h| h.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Make writes of products with this name fail
    pub fn fail_writes_for(&self, name: &str) {
        self.state.lock().failing_names.push(name.to_string());
    }

    /// Make every following job creation fail
    pub fn fail_job_creation(&self) {
        self.state.lock().fail_job_creation = true;
    }

    /// Called with the running number of created products after each create
    pub fn on_product_created(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_created.lock() = Some(Arc::new(hook));
    }

    pub fn job(&self, job_id: Uuid) -> Option<ImportJob> {
        self.state.lock().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Insert a PENDING job without going through the async trait
    pub fn create_job_now(&self, file_name: &str) -> ImportJob {
        let now = Utc::now();
        let job = ImportJob {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            uploader_id: None,
            status: ImportJobStatus::Pending,
            total_count: 0,
            success_count: 0,
            failed_count: 0,
            report_url: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().jobs.push(job.clone());
        job
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().audit.clone()
    }

    fn with_job(&self, job_id: Uuid, update: impl FnOnce(&mut ImportJob)) -> Result<()> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("import job {} not found", job_id))?;
        update(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn supplier_exists(&self, supplier_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().suppliers.contains_key(&supplier_id))
    }

    async fn find_supplier_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        Ok(self
            .state
            .lock()
            .suppliers
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id))
    }

    async fn find_product(
        &self,
        supplier_id: Uuid,
        name: &str,
        spec: &str,
    ) -> Result<Option<ExistingProduct>> {
        Ok(self.product(supplier_id, name, spec).map(|p| ExistingProduct {
            id: p.id,
            price: p.price,
        }))
    }

    async fn create_imported_product(&self, row: &ValidatedRow) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let created = {
            let mut state = self.state.lock();
            state.writes += 1;
            if state.failing_names.contains(&row.name) {
                return Err(anyhow!("simulated write failure"));
            }
            state.products.push(StoredProduct {
                id,
                supplier_id: row.supplier_id,
                name: row.name.clone(),
                spec: row.spec.clone(),
                price: row.price,
                lead_days: row.lead_days,
                quantity: row.quantity,
                description: row.description.clone(),
                note: row.note.clone(),
                barcode: row.barcode.clone(),
                images: vec![DEFAULT_PRODUCT_IMAGE_URL.to_string()],
            });
            state.created.push(row.name.clone());
            state.created.len()
        };

        let hook = self.on_created.lock().clone();
        if let Some(hook) = hook {
            hook(created);
        }
        Ok(id)
    }

    async fn update_imported_product(
        &self,
        product_id: Uuid,
        row: &ValidatedRow,
        price_change: Option<PriceChange>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.writes += 1;
        if state.failing_names.contains(&row.name) {
            return Err(anyhow!("simulated write failure"));
        }
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| anyhow!("product {} not found", product_id))?;
        product.price = row.price;
        product.lead_days = row.lead_days;
        product.quantity = row.quantity;
        if row.note.is_some() {
            product.note = row.note.clone();
        }
        if row.barcode.is_some() {
            product.barcode = row.barcode.clone();
        }
        if let Some(change) = price_change {
            state.price_history.push(StoredPriceChange {
                product_id,
                old_price: change.old_price,
                new_price: change.new_price,
                changed_by: change.changed_by,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ImportJobStore for MemoryStore {
    async fn create_job(
        &self,
        file_name: &str,
        uploader_id: Option<Uuid>,
        total: i32,
    ) -> Result<ImportJob> {
        if self.state.lock().fail_job_creation {
            return Err(anyhow!("job table unavailable"));
        }
        let mut job = self.create_job_now(file_name);
        job.uploader_id = uploader_id;
        job.total_count = total;
        self.with_job(job.id, |stored| {
            stored.uploader_id = uploader_id;
            stored.total_count = total;
        })?;
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>> {
        Ok(self.job(job_id))
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ImportJob>> {
        let mut jobs = self.state.lock().jobs.clone();
        jobs.reverse();
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn mark_running(&self, job_id: Uuid, total: i32) -> Result<()> {
        self.with_job(job_id, |job| {
            job.status = ImportJobStatus::Running;
            job.total_count = total;
        })
    }

    async fn update_counts(&self, job_id: Uuid, success: i32, failed: i32) -> Result<()> {
        self.with_job(job_id, |job| {
            job.success_count = success;
            job.failed_count = failed;
        })
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        success: i32,
        failed: i32,
        report_url: Option<&str>,
    ) -> Result<()> {
        // Deleted jobs are simply gone
        if self.job(job_id).is_none() {
            return Ok(());
        }
        self.with_job(job_id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.status = status;
            job.success_count = success;
            job.failed_count = failed;
            job.report_url = report_url.map(str::to_string);
        })
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|j| j.id != job_id);
        Ok(state.jobs.len() != before)
    }
}

#[async_trait]
impl AuditTrail for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.state.lock().audit.push(entry);
        Ok(())
    }
}
