//! Spreadsheet import types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

// =============================================================================
// Jobs
// =============================================================================

/// `PENDING → RUNNING → SUCCESS | FAILED`. SUCCESS means the file was
/// processed to the end, not that every row was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_job_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportJobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ImportJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportJobStatus::Success | ImportJobStatus::Failed)
    }
}

/// Import job record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub file_name: String,
    pub uploader_id: Option<Uuid>,
    pub status: ImportJobStatus,
    pub total_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    /// Report file name relative to the upload root
    pub report_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How rows matching an existing (supplier, name, spec) are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    #[default]
    Skip,
    Update,
}

impl DuplicateMode {
    /// Lenient parse of the multipart `mode` field, anything but `update` skips
    pub fn from_form(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("update") => DuplicateMode::Update,
            _ => DuplicateMode::Skip,
        }
    }
}

// =============================================================================
// Field mapping
// =============================================================================

/// Canonical columns an import spreadsheet can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductField {
    Supplier,
    SupplierId,
    Name,
    Spec,
    Price,
    LeadDays,
    Note,
    Description,
    Quantity,
    Brand,
    Category,
    Unit,
    Origin,
    Barcode,
}

impl ProductField {
    pub fn from_key(key: &str) -> Option<Self> {
        let field = match key.trim() {
            "supplier" => ProductField::Supplier,
            "supplierId" => ProductField::SupplierId,
            "name" => ProductField::Name,
            "spec" => ProductField::Spec,
            "price" => ProductField::Price,
            "leadDays" => ProductField::LeadDays,
            "note" => ProductField::Note,
            "description" => ProductField::Description,
            "quantity" => ProductField::Quantity,
            "brand" => ProductField::Brand,
            "category" => ProductField::Category,
            "unit" => ProductField::Unit,
            "origin" => ProductField::Origin,
            "barcode" => ProductField::Barcode,
            _ => return None,
        };
        Some(field)
    }
}

/// Resolved header → field mapping
pub type FieldMapping = HashMap<String, ProductField>;

/// Caller-provided mapping; `None` marks a header the caller chose to ignore
pub type SuppliedMapping = HashMap<String, Option<ProductField>>;

// =============================================================================
// Row results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowErrorCode {
    Required,
    SupplierNotFound,
    InvalidPrice,
    InvalidQuantity,
    Duplicate,
    Unknown,
}

impl RowErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowErrorCode::Required => "REQUIRED",
            RowErrorCode::SupplierNotFound => "SUPPLIER_NOT_FOUND",
            RowErrorCode::InvalidPrice => "INVALID_PRICE",
            RowErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            RowErrorCode::Duplicate => "DUPLICATE",
            RowErrorCode::Unknown => "UNKNOWN",
        }
    }
}

/// One rejected or skipped row; `row` is the spreadsheet line number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub code: RowErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Counters produced by one importer run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: Vec<RowError>,
}

impl ImportOutcome {
    pub fn absorb(&mut self, other: ImportOutcome) {
        self.total += other.total;
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }
}

/// In-memory progress of a queued job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub status: ImportJobStatus,
    pub processed: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: Vec<RowError>,
    pub report_path: Option<String>,
}

impl ImportProgress {
    pub fn pending() -> Self {
        Self {
            status: ImportJobStatus::Pending,
            processed: 0,
            total: 0,
            success: 0,
            failed: 0,
            skipped: 0,
            updated: 0,
            errors: Vec::new(),
            report_path: None,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncImportResponse {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job: ImportJob,
    pub progress: Option<ImportProgress>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub file_name: String,
    pub total_rows: usize,
    pub headers: Vec<String>,
    pub mapping: FieldMapping,
    pub sample: Vec<Vec<String>>,
}
