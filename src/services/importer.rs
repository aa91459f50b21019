//! Row validation and catalog writes for product imports
//!
//! Rows are processed strictly one after another. A row either passes every
//! check and is written, or is rejected before anything touches the catalog.
//! Store failures while handling a row are recorded as `UNKNOWN` for that row
//! and the batch carries on.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::field_mapper::MappedRow;
use crate::types::{DuplicateMode, ImportOutcome, RowError, RowErrorCode};

/// `changed_by` value used when no user is attached to the import
pub const SYSTEM_ACTOR: &str = "system";

// =============================================================================
// Catalog seam
// =============================================================================

/// Product that already exists for a (supplier, name, spec) key
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingProduct {
    pub id: Uuid,
    pub price: Decimal,
}

/// Row that passed validation, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub supplier_id: Uuid,
    pub name: String,
    pub spec: String,
    pub price: Decimal,
    pub lead_days: i32,
    pub quantity: i32,
    pub description: Option<String>,
    pub note: Option<String>,
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceChange {
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub changed_by: String,
}

/// Catalog operations the importer needs
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn supplier_exists(&self, supplier_id: Uuid) -> Result<bool>;

    async fn find_supplier_by_name(&self, name: &str) -> Result<Option<Uuid>>;

    async fn find_product(
        &self,
        supplier_id: Uuid,
        name: &str,
        spec: &str,
    ) -> Result<Option<ExistingProduct>>;

    /// Create the product together with its placeholder cover image
    async fn create_imported_product(&self, row: &ValidatedRow) -> Result<Uuid>;

    /// Overwrite price, lead days, quantity, note and barcode. When
    /// `price_change` is set a price-history entry is written in the same
    /// transaction.
    async fn update_imported_product(
        &self,
        product_id: Uuid,
        row: &ValidatedRow,
        price_change: Option<PriceChange>,
    ) -> Result<()>;
}

// =============================================================================
// Importer
// =============================================================================

/// Per-run settings shared by every row
#[derive(Debug, Clone, Default)]
pub struct ImportContext {
    /// Supplier chosen in the UI; overrides any supplier column
    pub supplier_id: Option<Uuid>,
    pub mode: DuplicateMode,
    pub actor_id: Option<Uuid>,
}

impl ImportContext {
    fn changed_by(&self) -> String {
        self.actor_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }
}

enum RowResult {
    Created,
    Updated,
    Skipped(RowError),
}

/// Validate and import `rows` in order, returning counters and row errors
pub async fn import_rows(
    store: &dyn CatalogStore,
    rows: &[MappedRow],
    ctx: &ImportContext,
) -> ImportOutcome {
    let mut outcome = ImportOutcome {
        total: rows.len(),
        ..Default::default()
    };

    for row in rows {
        match import_row(store, row, ctx).await {
            Ok(RowResult::Created) => outcome.success += 1,
            Ok(RowResult::Updated) => outcome.updated += 1,
            Ok(RowResult::Skipped(note)) => {
                outcome.skipped += 1;
                outcome.errors.push(note);
            }
            Err(error) => {
                outcome.failed += 1;
                outcome.errors.push(error);
            }
        }
    }

    debug!(
        total = outcome.total,
        success = outcome.success,
        failed = outcome.failed,
        skipped = outcome.skipped,
        updated = outcome.updated,
        "Import batch processed"
    );
    outcome
}

async fn import_row(
    store: &dyn CatalogStore,
    row: &MappedRow,
    ctx: &ImportContext,
) -> Result<RowResult, RowError> {
    let line = row.line;
    let unknown = |e: anyhow::Error| {
        warn!(line, "Import row failed: {:#}", e);
        RowError {
            row: line,
            code: RowErrorCode::Unknown,
            field: None,
            message: e.to_string(),
        }
    };

    let (name, spec, raw_price) = match (
        present(&row.name),
        present(&row.spec),
        present(&row.price),
    ) {
        (Some(name), Some(spec), Some(price)) => (name, spec, price),
        _ => {
            return Err(row_error(
                line,
                RowErrorCode::Required,
                "name/spec/price",
                "缺少必填字段：名称、规格或单价",
            ))
        }
    };

    let supplier_id = resolve_supplier(store, row, ctx).await.map_err(|e| match e {
        SupplierLookup::Failed(e) => unknown(e),
        SupplierLookup::Rejected(err) => err,
    })?;

    let price = parse_price(raw_price)
        .ok_or_else(|| row_error(line, RowErrorCode::InvalidPrice, "price", "单价格式不正确"))?;

    let lead_days = parse_lead_days(row.lead_days.as_deref());

    let quantity = row
        .quantity
        .as_deref()
        .and_then(parse_leading_int)
        .filter(|q| *q >= 1)
        .and_then(|q| i32::try_from(q).ok())
        .ok_or_else(|| {
            row_error(
                line,
                RowErrorCode::InvalidQuantity,
                "quantity",
                "数量必须为不小于 1 的整数",
            )
        })?;

    let validated = ValidatedRow {
        supplier_id,
        name: name.to_string(),
        spec: spec.to_string(),
        price,
        lead_days,
        quantity,
        description: row.description.clone(),
        note: row.note.clone(),
        barcode: row.barcode.clone(),
    };

    let existing = store
        .find_product(supplier_id, name, spec)
        .await
        .map_err(unknown)?;

    match existing {
        Some(existing) if ctx.mode == DuplicateMode::Update => {
            let price_change = (existing.price != validated.price).then(|| PriceChange {
                old_price: existing.price,
                new_price: validated.price,
                changed_by: ctx.changed_by(),
            });
            store
                .update_imported_product(existing.id, &validated, price_change)
                .await
                .map_err(unknown)?;
            Ok(RowResult::Updated)
        }
        Some(_) => Ok(RowResult::Skipped(RowError {
            row: line,
            code: RowErrorCode::Duplicate,
            field: None,
            message: "产品已存在，跳过".to_string(),
        })),
        None => {
            store
                .create_imported_product(&validated)
                .await
                .map_err(unknown)?;
            Ok(RowResult::Created)
        }
    }
}

enum SupplierLookup {
    Rejected(RowError),
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for SupplierLookup {
    fn from(e: anyhow::Error) -> Self {
        SupplierLookup::Failed(e)
    }
}

/// Explicit supplier first, then the row's supplier id column, then a lookup
/// by the supplier name column. Whatever id is found must exist.
async fn resolve_supplier(
    store: &dyn CatalogStore,
    row: &MappedRow,
    ctx: &ImportContext,
) -> Result<Uuid, SupplierLookup> {
    let not_found = || {
        SupplierLookup::Rejected(row_error(
            row.line,
            RowErrorCode::SupplierNotFound,
            "supplierId",
            "供应商不存在或已删除",
        ))
    };

    let explicit = match (ctx.supplier_id, present(&row.supplier_id)) {
        (Some(id), _) => Some(id),
        (None, Some(raw)) => Some(Uuid::parse_str(raw).map_err(|_| not_found())?),
        (None, None) => None,
    };

    let resolved = match explicit {
        Some(id) => Some(id),
        None => match present(&row.supplier) {
            Some(name) => store.find_supplier_by_name(name).await?,
            None => None,
        },
    };

    let Some(id) = resolved else {
        return Err(SupplierLookup::Rejected(row_error(
            row.line,
            RowErrorCode::SupplierNotFound,
            "supplierId/supplier",
            "缺少供应商或供应商不存在",
        )));
    };

    if store.supplier_exists(id).await? {
        Ok(id)
    } else {
        Err(not_found())
    }
}

fn row_error(line: usize, code: RowErrorCode, field: &str, message: &str) -> RowError {
    RowError {
        row: line,
        code,
        field: Some(field.to_string()),
        message: message.to_string(),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Cell parsing
// =============================================================================

/// Parse a price cell. Thousands separators and whitespace are ignored and the
/// value is rounded half-up to cents.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '，' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Blank or unreadable lead days fall back to 0
pub fn parse_lead_days(raw: Option<&str>) -> i32 {
    raw.and_then(parse_leading_int)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

/// Integer prefix of a cell (`"15天"` → 15, `"2.5"` → 2, `"abc"` → None)
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| v * sign)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use crate::types::ProductField;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(line: usize, name: &str, spec: &str, price: &str, quantity: &str) -> MappedRow {
        MappedRow::new(line)
            .with(ProductField::Name, name)
            .with(ProductField::Spec, spec)
            .with(ProductField::Price, price)
            .with(ProductField::Quantity, quantity)
    }

    fn ctx(supplier_id: Uuid, mode: DuplicateMode) -> ImportContext {
        ImportContext {
            supplier_id: Some(supplier_id),
            mode,
            actor_id: None,
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("1,234.50"), Some(dec("1234.50")));
        assert_eq!(parse_price(" 12 .5 "), Some(dec("12.5")));
        assert_eq!(parse_price("0.005"), Some(dec("0.01")));
        assert_eq!(parse_price("1e2"), Some(dec("100")));
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price(" , "), None);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("15"), Some(15));
        assert_eq!(parse_leading_int("15天"), Some(15));
        assert_eq!(parse_leading_int("2.5"), Some(2));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn test_parse_lead_days_defaults_to_zero() {
        assert_eq!(parse_lead_days(None), 0);
        assert_eq!(parse_lead_days(Some("两周")), 0);
        assert_eq!(parse_lead_days(Some("7")), 7);
    }

    #[tokio::test]
    async fn test_missing_required_fields_never_write() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");

        let rows = vec![
            row(2, "", "M4", "1.5", "1"),
            row(3, "螺丝", "", "1.5", "1"),
            row(4, "螺丝", "M4", "", "1"),
        ];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Skip)).await;

        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.success, 0);
        assert!(outcome.errors.iter().all(|e| e.code == RowErrorCode::Required));
        assert_eq!(outcome.errors[0].row, 2);
        assert_eq!(outcome.errors[0].field.as_deref(), Some("name/spec/price"));
        assert_eq!(store.product_count(), 0);
    }

    #[tokio::test]
    async fn test_new_rows_are_created_with_cover_image() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");

        let rows = vec![
            row(2, "螺丝", "M4", "1,200.5", "10").with(ProductField::LeadDays, "7天"),
            row(3, "螺母", "M4", "0.2", "100"),
        ];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Skip)).await;

        assert_eq!(outcome.success, 2);
        assert!(outcome.errors.is_empty());
        let screw = store.product(supplier, "螺丝", "M4").unwrap();
        assert_eq!(screw.price, dec("1200.50"));
        assert_eq!(screw.lead_days, 7);
        assert_eq!(screw.quantity, 10);
        assert_eq!(screw.images, vec![crate::types::DEFAULT_PRODUCT_IMAGE_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_supplier_resolution() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        let no_ctx = ImportContext::default();

        let rows = vec![
            // By supplier name column
            row(2, "螺丝", "M4", "1", "1").with(ProductField::Supplier, "华东五金"),
            // Unknown supplier name
            row(3, "螺丝", "M5", "1", "1").with(ProductField::Supplier, "不存在的供应商"),
            // No supplier at all
            row(4, "螺丝", "M6", "1", "1"),
            // Supplier id column that does not exist
            row(5, "螺丝", "M8", "1", "1")
                .with(ProductField::SupplierId, &Uuid::new_v4().to_string()),
            // Supplier id column that is not a uuid
            row(6, "螺丝", "M10", "1", "1").with(ProductField::SupplierId, "42"),
        ];
        let outcome = import_rows(&store, &rows, &no_ctx).await;

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed, 4);
        assert!(store.product(supplier, "螺丝", "M4").is_some());
        let fields: Vec<_> = outcome.errors.iter().map(|e| e.field.as_deref().unwrap()).collect();
        assert_eq!(
            fields,
            vec!["supplierId/supplier", "supplierId/supplier", "supplierId", "supplierId"]
        );
        assert!(outcome
            .errors
            .iter()
            .all(|e| e.code == RowErrorCode::SupplierNotFound));
    }

    #[tokio::test]
    async fn test_explicit_supplier_must_exist() {
        let store = MemoryStore::new();
        let rows = vec![row(2, "螺丝", "M4", "1", "1")];
        let outcome = import_rows(&store, &rows, &ctx(Uuid::new_v4(), DuplicateMode::Skip)).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors[0].code, RowErrorCode::SupplierNotFound);
        assert_eq!(outcome.errors[0].field.as_deref(), Some("supplierId"));
    }

    #[tokio::test]
    async fn test_invalid_price_and_quantity() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");

        let rows = vec![
            row(2, "螺丝", "M4", "十元", "1"),
            row(3, "螺丝", "M5", "1", "0"),
            row(4, "螺丝", "M6", "1", ""),
            row(5, "螺丝", "M8", "1", "很多"),
        ];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Skip)).await;

        let codes: Vec<_> = outcome.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                RowErrorCode::InvalidPrice,
                RowErrorCode::InvalidQuantity,
                RowErrorCode::InvalidQuantity,
                RowErrorCode::InvalidQuantity,
            ]
        );
        assert_eq!(store.product_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_mode_records_duplicate_as_skipped() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        store.add_product(supplier, "螺丝", "M4", dec("1.00"));

        let rows = vec![row(2, "螺丝", "M4", "9.99", "5")];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Skip)).await;

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.errors[0].code, RowErrorCode::Duplicate);
        let product = store.product(supplier, "螺丝", "M4").unwrap();
        assert_eq!(product.price, dec("1.00"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_mode_is_idempotent() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        let rows = vec![row(2, "螺丝", "M4", "1", "1"), row(3, "螺母", "M4", "2", "1")];
        let context = ctx(supplier, DuplicateMode::Skip);

        let first = import_rows(&store, &rows, &context).await;
        let second = import_rows(&store, &rows, &context).await;

        assert_eq!(first.success, 2);
        assert_eq!(second.success, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.product_count(), 2);
    }

    #[tokio::test]
    async fn test_update_mode_overwrites_and_records_price_change() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        store.add_product(supplier, "螺丝", "M4", dec("1.00"));
        let actor = Uuid::new_v4();

        let rows = vec![row(2, "螺丝", "M4", "1.25", "8")
            .with(ProductField::LeadDays, "3")
            .with(ProductField::Note, "新批次")
            .with(ProductField::Barcode, "6901234567890")];
        let context = ImportContext {
            supplier_id: Some(supplier),
            mode: DuplicateMode::Update,
            actor_id: Some(actor),
        };
        let outcome = import_rows(&store, &rows, &context).await;

        assert_eq!(outcome.updated, 1);
        let product = store.product(supplier, "螺丝", "M4").unwrap();
        assert_eq!(product.price, dec("1.25"));
        assert_eq!(product.lead_days, 3);
        assert_eq!(product.quantity, 8);
        assert_eq!(product.note.as_deref(), Some("新批次"));
        assert_eq!(product.barcode.as_deref(), Some("6901234567890"));

        let history = store.price_history(product.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_price, dec("1.00"));
        assert_eq!(history[0].new_price, dec("1.25"));
        assert_eq!(history[0].changed_by, actor.to_string());
    }

    #[tokio::test]
    async fn test_update_mode_without_price_change_writes_no_history() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        store.add_product(supplier, "螺丝", "M4", dec("1.00"));

        let rows = vec![row(2, "螺丝", "M4", "1", "20")];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Update)).await;

        assert_eq!(outcome.updated, 1);
        let product = store.product(supplier, "螺丝", "M4").unwrap();
        assert_eq!(product.quantity, 20);
        assert!(store.price_history(product.id).is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_recorded_as_unknown_and_batch_continues() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        store.fail_writes_for("坏数据");

        let rows = vec![row(2, "坏数据", "X", "1", "1"), row(3, "螺丝", "M4", "1", "1")];
        let outcome = import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Skip)).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.errors[0].code, RowErrorCode::Unknown);
        assert_eq!(outcome.errors[0].row, 2);
    }

    #[tokio::test]
    async fn test_system_actor_recorded_without_user() {
        let store = MemoryStore::new();
        let supplier = store.add_supplier("华东五金");
        store.add_product(supplier, "螺丝", "M4", dec("1.00"));

        let rows = vec![row(2, "螺丝", "M4", "2", "1")];
        import_rows(&store, &rows, &ctx(supplier, DuplicateMode::Update)).await;

        let product = store.product(supplier, "螺丝", "M4").unwrap();
        assert_eq!(store.price_history(product.id)[0].changed_by, SYSTEM_ACTOR);
    }
}
