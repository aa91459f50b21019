//! Supplier database queries

use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use crate::types::supplier::{
    CreateSupplierRequest, Supplier, SupplierListQuery, UpdateSupplierRequest,
};
use crate::types::PageRequest;

const SUPPLIER_COLUMNS: &str = r#"
    id, name, contact, phone, address,
    bank_name, bank_account_name, bank_account_number,
    category, note, status, created_at, updated_at
"#;

/// `%value%` for ILIKE, with LIKE wildcards in the value escaped
pub fn contains_pattern(value: &str) -> String {
    let escaped = value
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn create_supplier(pool: &PgPool, req: &CreateSupplierRequest) -> Result<Supplier> {
    let query = format!(
        r#"
        INSERT INTO suppliers (
            id, name, contact, phone, address,
            bank_name, bank_account_name, bank_account_number,
            category, note, status, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        RETURNING {}
        "#,
        SUPPLIER_COLUMNS
    );

    let supplier = sqlx::query_as::<_, Supplier>(&query)
        .bind(Uuid::new_v4())
        .bind(req.name.trim())
        .bind(&req.contact)
        .bind(&req.phone)
        .bind(&req.address)
        .bind(&req.bank_name)
        .bind(&req.bank_account_name)
        .bind(&req.bank_account_number)
        .bind(req.category)
        .bind(&req.note)
        .bind(req.status.unwrap_or_default())
        .fetch_one(pool)
        .await?;

    Ok(supplier)
}

pub async fn get_supplier(pool: &PgPool, supplier_id: Uuid) -> Result<Option<Supplier>> {
    let query = format!("SELECT {} FROM suppliers WHERE id = $1", SUPPLIER_COLUMNS);
    let supplier = sqlx::query_as::<_, Supplier>(&query)
        .bind(supplier_id)
        .fetch_optional(pool)
        .await?;

    Ok(supplier)
}

/// Exact name lookup (import supplier column)
pub async fn find_supplier_id_by_name(pool: &PgPool, name: &str) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM suppliers WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

pub async fn supplier_exists(pool: &PgPool, supplier_id: Uuid) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM suppliers WHERE id = $1)")
        .bind(supplier_id)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

/// Whether another supplier already uses `name`
pub async fn supplier_name_taken(pool: &PgPool, name: &str, except: Option<Uuid>) -> Result<bool> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM suppliers WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))"
    )
    .bind(name.trim())
    .bind(except)
    .fetch_one(pool)
    .await?;

    Ok(taken)
}

/// Filtered, paginated supplier list with total count
pub async fn list_suppliers(
    pool: &PgPool,
    filter: &SupplierListQuery,
    page: PageRequest,
) -> Result<(Vec<Supplier>, i64)> {
    let search = non_blank(&filter.search).map(contains_pattern);
    let name = non_blank(&filter.name).map(contains_pattern);
    let phone = non_blank(&filter.phone).map(contains_pattern);

    let mut conditions = vec!["TRUE".to_string()];
    let mut param_count = 0;

    if search.is_some() {
        param_count += 1;
        conditions.push(format!(
            "(name ILIKE ${p} OR contact ILIKE ${p} OR phone ILIKE ${p})",
            p = param_count
        ));
    }
    if name.is_some() {
        param_count += 1;
        conditions.push(format!("name ILIKE ${}", param_count));
    }
    if filter.category.is_some() {
        param_count += 1;
        conditions.push(format!("category = ${}", param_count));
    }
    if phone.is_some() {
        param_count += 1;
        conditions.push(format!("phone ILIKE ${}", param_count));
    }

    let where_clause = conditions.join(" AND ");

    let query = format!(
        r#"
        SELECT {}
        FROM suppliers
        WHERE {}
        ORDER BY created_at DESC
        LIMIT ${} OFFSET ${}
        "#,
        SUPPLIER_COLUMNS,
        where_clause,
        param_count + 1,
        param_count + 2
    );
    let count_query = format!("SELECT COUNT(*) FROM suppliers WHERE {}", where_clause);

    let mut query_builder = sqlx::query_as::<_, Supplier>(&query);
    let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);

    if let Some(pattern) = &search {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }
    if let Some(pattern) = &name {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }
    if let Some(category) = filter.category {
        query_builder = query_builder.bind(category);
        count_builder = count_builder.bind(category);
    }
    if let Some(pattern) = &phone {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }

    query_builder = query_builder.bind(page.limit()).bind(page.offset());

    let suppliers = query_builder.fetch_all(pool).await?;
    let total = count_builder.fetch_one(pool).await?;

    Ok((suppliers, total))
}

pub async fn update_supplier(
    pool: &PgPool,
    supplier_id: Uuid,
    req: &UpdateSupplierRequest,
) -> Result<Option<Supplier>> {
    let query = format!(
        r#"
        UPDATE suppliers
        SET
            name = COALESCE($2, name),
            contact = COALESCE($3, contact),
            phone = COALESCE($4, phone),
            address = COALESCE($5, address),
            bank_name = COALESCE($6, bank_name),
            bank_account_name = COALESCE($7, bank_account_name),
            bank_account_number = COALESCE($8, bank_account_number),
            category = COALESCE($9, category),
            note = COALESCE($10, note),
            status = COALESCE($11, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        SUPPLIER_COLUMNS
    );

    let supplier = sqlx::query_as::<_, Supplier>(&query)
        .bind(supplier_id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.contact)
        .bind(&req.phone)
        .bind(&req.address)
        .bind(&req.bank_name)
        .bind(&req.bank_account_name)
        .bind(&req.bank_account_number)
        .bind(req.category)
        .bind(&req.note)
        .bind(req.status)
        .fetch_optional(pool)
        .await?;

    Ok(supplier)
}

/// Delete a supplier; its products go with it
pub async fn delete_supplier(pool: &PgPool, supplier_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
        .bind(supplier_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_suppliers(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM suppliers")
        .fetch_one(pool)
        .await?;

    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern(" 华东 "), "%华东%");
        assert_eq!(contains_pattern("100%_a"), "%100\\%\\_a%");
    }
}
