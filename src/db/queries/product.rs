//! Product, product image and price history queries

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use super::supplier::contains_pattern;
use crate::services::importer::{ExistingProduct, PriceChange, ValidatedRow};
use crate::types::product::{
    CreateProductRequest, PriceHistory, Product, ProductImage, ProductListItem, ProductListQuery,
    UpdateProductRequest, DEFAULT_PRODUCT_IMAGE_URL,
};
use crate::types::PageRequest;

const PRODUCT_COLUMNS: &str = r#"
    id, supplier_id, name, spec, price, lead_days, quantity,
    description, note, barcode, created_at, updated_at
"#;

/// Price history entries shown on the product detail
pub const PRICE_HISTORY_LIMIT: i64 = 10;

pub async fn create_product(pool: &PgPool, req: &CreateProductRequest) -> Result<Product> {
    let query = format!(
        r#"
        INSERT INTO products (
            id, supplier_id, name, spec, price, lead_days, quantity,
            description, note, barcode, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    );

    let product = sqlx::query_as::<_, Product>(&query)
        .bind(Uuid::new_v4())
        .bind(req.supplier_id)
        .bind(req.name.trim())
        .bind(req.spec.trim())
        .bind(req.price)
        .bind(req.lead_days.unwrap_or(0))
        .bind(req.quantity.unwrap_or(1))
        .bind(&req.description)
        .bind(&req.note)
        .bind(&req.barcode)
        .fetch_one(pool)
        .await?;

    Ok(product)
}

pub async fn get_product(pool: &PgPool, product_id: Uuid) -> Result<Option<Product>> {
    let query = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
    let product = sqlx::query_as::<_, Product>(&query)
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

    Ok(product)
}

/// Latest products of a supplier
pub async fn list_supplier_products(pool: &PgPool, supplier_id: Uuid, limit: i64) -> Result<Vec<Product>> {
    let query = format!(
        "SELECT {} FROM products WHERE supplier_id = $1 ORDER BY created_at DESC LIMIT $2",
        PRODUCT_COLUMNS
    );
    let products = sqlx::query_as::<_, Product>(&query)
        .bind(supplier_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(products)
}

/// Filtered, paginated product list with supplier name and cover image
pub async fn list_products(
    pool: &PgPool,
    filter: &ProductListQuery,
    page: PageRequest,
) -> Result<(Vec<ProductListItem>, i64)> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let mut conditions = vec!["TRUE".to_string()];
    let mut param_count = 0;

    if search.is_some() {
        param_count += 1;
        conditions.push(format!(
            "(p.name ILIKE ${n} OR p.spec ILIKE ${n} OR p.barcode ILIKE ${n})",
            n = param_count
        ));
    }
    if filter.supplier_id.is_some() {
        param_count += 1;
        conditions.push(format!("p.supplier_id = ${}", param_count));
    }

    let where_clause = conditions.join(" AND ");

    let query = format!(
        r#"
        SELECT
            p.id, p.supplier_id, p.name, p.spec, p.price, p.lead_days, p.quantity,
            p.description, p.note, p.barcode, p.created_at, p.updated_at,
            s.name AS supplier_name,
            (
                SELECT i.url FROM product_images i
                WHERE i.product_id = p.id
                ORDER BY i.sort ASC, i.created_at ASC
                LIMIT 1
            ) AS cover_url
        FROM products p
        JOIN suppliers s ON s.id = p.supplier_id
        WHERE {}
        ORDER BY p.created_at DESC
        LIMIT ${} OFFSET ${}
        "#,
        where_clause,
        param_count + 1,
        param_count + 2
    );
    let count_query = format!("SELECT COUNT(*) FROM products p WHERE {}", where_clause);

    let mut query_builder = sqlx::query_as::<_, ProductListItem>(&query);
    let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);

    if let Some(pattern) = &search {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }
    if let Some(supplier_id) = filter.supplier_id {
        query_builder = query_builder.bind(supplier_id);
        count_builder = count_builder.bind(supplier_id);
    }

    query_builder = query_builder.bind(page.limit()).bind(page.offset());

    let products = query_builder.fetch_all(pool).await?;
    let total = count_builder.fetch_one(pool).await?;

    Ok((products, total))
}

/// Update a product. A price change is recorded in the price history within
/// the same transaction.
pub async fn update_product(
    pool: &PgPool,
    product_id: Uuid,
    req: &UpdateProductRequest,
    changed_by: &str,
) -> Result<Option<Product>> {
    let mut tx = pool.begin().await?;

    let current: Option<Decimal> =
        sqlx::query_scalar("SELECT price FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(old_price) = current else {
        return Ok(None);
    };

    let query = format!(
        r#"
        UPDATE products
        SET
            name = COALESCE($2, name),
            spec = COALESCE($3, spec),
            price = COALESCE($4, price),
            lead_days = COALESCE($5, lead_days),
            quantity = COALESCE($6, quantity),
            description = COALESCE($7, description),
            note = COALESCE($8, note),
            barcode = COALESCE($9, barcode),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    );

    let product = sqlx::query_as::<_, Product>(&query)
        .bind(product_id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.spec.as_deref().map(str::trim))
        .bind(req.price)
        .bind(req.lead_days)
        .bind(req.quantity)
        .bind(&req.description)
        .bind(&req.note)
        .bind(&req.barcode)
        .fetch_one(&mut *tx)
        .await?;

    if product.price != old_price {
        insert_price_history(&mut tx, product_id, old_price, product.price, changed_by).await?;
    }

    tx.commit().await?;
    Ok(Some(product))
}

async fn insert_price_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    product_id: Uuid,
    old_price: Decimal,
    new_price: Decimal,
    changed_by: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO price_history (id, product_id, old_price, new_price, changed_by, changed_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(old_price)
    .bind(new_price)
    .bind(changed_by)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn delete_product(pool: &PgPool, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_price_history(pool: &PgPool, product_id: Uuid, limit: i64) -> Result<Vec<PriceHistory>> {
    let history = sqlx::query_as::<_, PriceHistory>(
        r#"
        SELECT id, product_id, old_price, new_price, changed_by, changed_at
        FROM price_history
        WHERE product_id = $1
        ORDER BY changed_at DESC
        LIMIT $2
        "#
    )
    .bind(product_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(history)
}

// =============================================================================
// Images
// =============================================================================

pub async fn list_product_images(pool: &PgPool, product_id: Uuid) -> Result<Vec<ProductImage>> {
    let images = sqlx::query_as::<_, ProductImage>(
        r#"
        SELECT id, product_id, url, sort, created_at
        FROM product_images
        WHERE product_id = $1
        ORDER BY sort ASC, created_at ASC
        "#
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(images)
}

pub async fn add_product_image(pool: &PgPool, product_id: Uuid, url: &str, sort: i32) -> Result<ProductImage> {
    let image = sqlx::query_as::<_, ProductImage>(
        r#"
        INSERT INTO product_images (id, product_id, url, sort, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING id, product_id, url, sort, created_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(url)
    .bind(sort)
    .fetch_one(pool)
    .await?;

    Ok(image)
}

/// Delete an image record, returning it so the caller can drop the file
pub async fn delete_product_image(pool: &PgPool, image_id: Uuid) -> Result<Option<ProductImage>> {
    let image = sqlx::query_as::<_, ProductImage>(
        r#"
        DELETE FROM product_images
        WHERE id = $1
        RETURNING id, product_id, url, sort, created_at
        "#
    )
    .bind(image_id)
    .fetch_optional(pool)
    .await?;

    Ok(image)
}

// =============================================================================
// Import
// =============================================================================

pub async fn find_product_by_key(
    pool: &PgPool,
    supplier_id: Uuid,
    name: &str,
    spec: &str,
) -> Result<Option<ExistingProduct>> {
    let row: Option<(Uuid, Decimal)> = sqlx::query_as(
        "SELECT id, price FROM products WHERE supplier_id = $1 AND name = $2 AND spec = $3"
    )
    .bind(supplier_id)
    .bind(name)
    .bind(spec)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, price)| ExistingProduct { id, price }))
}

/// Create an imported product with the placeholder cover image
pub async fn create_imported_product(pool: &PgPool, row: &ValidatedRow) -> Result<Uuid> {
    let mut tx = pool.begin().await?;
    let product_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO products (
            id, supplier_id, name, spec, price, lead_days, quantity,
            description, note, barcode, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
        "#
    )
    .bind(product_id)
    .bind(row.supplier_id)
    .bind(&row.name)
    .bind(&row.spec)
    .bind(row.price)
    .bind(row.lead_days)
    .bind(row.quantity)
    .bind(&row.description)
    .bind(&row.note)
    .bind(&row.barcode)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO product_images (id, product_id, url, sort, created_at)
        VALUES ($1, $2, $3, 0, NOW())
        "#
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(DEFAULT_PRODUCT_IMAGE_URL)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(product_id)
}

/// Overwrite an existing product from an import row
pub async fn update_imported_product(
    pool: &PgPool,
    product_id: Uuid,
    row: &ValidatedRow,
    price_change: Option<PriceChange>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE products
        SET
            price = $2,
            lead_days = $3,
            quantity = $4,
            note = COALESCE($5, note),
            barcode = COALESCE($6, barcode),
            updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(product_id)
    .bind(row.price)
    .bind(row.lead_days)
    .bind(row.quantity)
    .bind(&row.note)
    .bind(&row.barcode)
    .execute(&mut *tx)
    .await?;

    if let Some(change) = price_change {
        insert_price_history(
            &mut tx,
            product_id,
            change.old_price,
            change.new_price,
            &change.changed_by,
        )
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

// =============================================================================
// Stats
// =============================================================================

/// Number of products and the sum of their prices
pub async fn catalog_totals(pool: &PgPool) -> Result<(i64, Decimal)> {
    let row: (i64, Decimal) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(price), 0) FROM products")
            .fetch_one(pool)
            .await?;

    Ok(row)
}
