//! Header → product field mapping for spreadsheet imports

use std::collections::HashSet;

use crate::services::spreadsheet::{ParsedSheet, SheetRow};
use crate::types::{FieldMapping, ProductField, SuppliedMapping};

/// Synonyms per field, checked in this order; the first field with a synonym
/// contained in the normalized header wins. Supplier columns come first so
/// that `供应商名称` is not taken for a product name.
const SYNONYMS: &[(ProductField, &[&str])] = &[
    (ProductField::SupplierId, &["供应商id", "supplierid", "supplier_id"]),
    (ProductField::Supplier, &["供应商", "supplier"]),
    (ProductField::Name, &["名称", "品名", "商品名", "产品名称", "name"]),
    (ProductField::Spec, &["规格", "型号", "产品规格", "spec"]),
    (ProductField::Price, &["单价", "价格", "price"]),
    (ProductField::LeadDays, &["提前预定天数", "预定天数", "提前期", "lead_days", "leaddays"]),
    (ProductField::Note, &["备注", "说明", "note"]),
    (ProductField::Description, &["产品介绍", "介绍", "描述", "description"]),
    (ProductField::Quantity, &["数量", "qty", "quantity"]),
    (ProductField::Brand, &["品牌", "牌子", "brand"]),
    (ProductField::Category, &["分类", "类别", "品类", "category"]),
    (ProductField::Unit, &["单位", "计量单位", "unit"]),
    (ProductField::Origin, &["产地", "来源地", "origin"]),
    (ProductField::Barcode, &["条码", "条形码", "barcode"]),
];

/// Strip all whitespace (ideographic space included) and lowercase
fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Field a single header maps to, if any
pub fn match_header(header: &str) -> Option<ProductField> {
    let normalized = normalize(header);
    if normalized.is_empty() {
        return None;
    }
    SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| normalized.contains(s)))
        .map(|(field, _)| *field)
}

pub fn auto_map_fields(headers: &[String]) -> FieldMapping {
    headers
        .iter()
        .filter_map(|h| match_header(h).map(|field| (h.clone(), field)))
        .collect()
}

/// Merge a caller-supplied mapping with auto-mapping. Supplied entries always
/// win; auto-mapping only fills headers the caller did not mention and never
/// targets a field the caller already assigned.
pub fn resolve_mapping(headers: &[String], supplied: Option<&SuppliedMapping>) -> FieldMapping {
    let supplied = match supplied {
        Some(m) if !m.is_empty() => m,
        _ => return auto_map_fields(headers),
    };

    let mut mapping: FieldMapping = supplied
        .iter()
        .filter_map(|(header, field)| field.map(|f| (header.clone(), f)))
        .collect();
    let claimed: HashSet<ProductField> = mapping.values().copied().collect();

    for (header, field) in auto_map_fields(headers) {
        if supplied.contains_key(&header) || claimed.contains(&field) {
            continue;
        }
        mapping.insert(header, field);
    }
    mapping
}

/// Parse the `mapping` multipart field: a JSON object of header → field key.
/// Null, empty or unknown keys mark the header as ignored.
pub fn parse_supplied_mapping(raw: &str) -> Result<SuppliedMapping, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(SuppliedMapping::new());
    }
    let parsed: std::collections::HashMap<String, Option<String>> = serde_json::from_str(raw)?;
    Ok(parsed
        .into_iter()
        .map(|(header, key)| {
            let field = key.as_deref().and_then(ProductField::from_key);
            (header, field)
        })
        .collect())
}

// =============================================================================
// Mapped rows
// =============================================================================

/// One spreadsheet row with its cells assigned to product fields.
/// Blank cells stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRow {
    pub line: usize,
    pub supplier: Option<String>,
    pub supplier_id: Option<String>,
    pub name: Option<String>,
    pub spec: Option<String>,
    pub price: Option<String>,
    pub lead_days: Option<String>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub origin: Option<String>,
    pub barcode: Option<String>,
}

impl MappedRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            ..Default::default()
        }
    }

    fn slot(&mut self, field: ProductField) -> &mut Option<String> {
        match field {
            ProductField::Supplier => &mut self.supplier,
            ProductField::SupplierId => &mut self.supplier_id,
            ProductField::Name => &mut self.name,
            ProductField::Spec => &mut self.spec,
            ProductField::Price => &mut self.price,
            ProductField::LeadDays => &mut self.lead_days,
            ProductField::Note => &mut self.note,
            ProductField::Description => &mut self.description,
            ProductField::Quantity => &mut self.quantity,
            ProductField::Brand => &mut self.brand,
            ProductField::Category => &mut self.category,
            ProductField::Unit => &mut self.unit,
            ProductField::Origin => &mut self.origin,
            ProductField::Barcode => &mut self.barcode,
        }
    }

    pub fn set(&mut self, field: ProductField, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            *self.slot(field) = Some(value.to_string());
        }
    }

    #[cfg(test)]
    pub fn with(mut self, field: ProductField, value: &str) -> Self {
        self.set(field, value);
        self
    }
}

pub fn map_row(headers: &[String], row: &SheetRow, mapping: &FieldMapping) -> MappedRow {
    let mut mapped = MappedRow::new(row.line);
    for (idx, header) in headers.iter().enumerate() {
        let Some(field) = mapping.get(header) else {
            continue;
        };
        if let Some(value) = row.cells.get(idx) {
            mapped.set(*field, value);
        }
    }
    mapped
}

pub fn map_rows(sheet: &ParsedSheet, mapping: &FieldMapping) -> Vec<MappedRow> {
    sheet
        .rows
        .iter()
        .map(|row| map_row(&sheet.headers, row, mapping))
        .collect()
}
