//! Quote and quote item queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use super::supplier::contains_pattern;
use crate::services::pricing::display_price;
use crate::types::quote::{
    AddQuoteItem, CreateQuoteRequest, Quote, QuoteItem, QuoteItemView, QuoteListQuery,
    QuoteStatus, UpdateQuoteItemRequest, UpdateQuoteRequest,
};
use crate::types::PageRequest;

const QUOTE_COLUMNS: &str = r#"
    id, code, creator_id, customer_name, customer_phone, customer_address,
    currency, tax_rate, status, note, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, quote_id, product_id, quantity, base_price, row_delta, row_amount,
    display_price, created_at
"#;

pub const DEFAULT_CURRENCY: &str = "CNY";

/// Quotes created at or after `since`
pub async fn count_quotes_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quotes WHERE created_at >= $1")
        .bind(since)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn count_quotes(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quotes")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn create_quote(
    pool: &PgPool,
    code: &str,
    creator_id: Uuid,
    req: &CreateQuoteRequest,
) -> Result<Quote> {
    let query = format!(
        r#"
        INSERT INTO quotes (
            id, code, creator_id, customer_name, customer_phone, customer_address,
            currency, tax_rate, status, note, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'DRAFT', $9, NOW(), NOW())
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    );

    let quote = sqlx::query_as::<_, Quote>(&query)
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(creator_id)
        .bind(req.customer_name.trim())
        .bind(&req.customer_phone)
        .bind(&req.customer_address)
        .bind(req.currency.as_deref().filter(|c| !c.trim().is_empty()).unwrap_or(DEFAULT_CURRENCY))
        .bind(req.tax_rate.unwrap_or(Decimal::ZERO))
        .bind(&req.note)
        .fetch_one(pool)
        .await?;

    Ok(quote)
}

pub async fn get_quote(pool: &PgPool, quote_id: Uuid) -> Result<Option<Quote>> {
    let query = format!("SELECT {} FROM quotes WHERE id = $1", QUOTE_COLUMNS);
    let quote = sqlx::query_as::<_, Quote>(&query)
        .bind(quote_id)
        .fetch_optional(pool)
        .await?;

    Ok(quote)
}

/// Filtered, paginated quote list. `creator_id` restricts to one creator.
pub async fn list_quotes(
    pool: &PgPool,
    filter: &QuoteListQuery,
    creator_id: Option<Uuid>,
    page: PageRequest,
) -> Result<(Vec<Quote>, i64)> {
    let customer = filter
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let mut conditions = vec!["TRUE".to_string()];
    let mut param_count = 0;

    if creator_id.is_some() {
        param_count += 1;
        conditions.push(format!("creator_id = ${}", param_count));
    }
    if filter.status.is_some() {
        param_count += 1;
        conditions.push(format!("status = ${}", param_count));
    }
    if customer.is_some() {
        param_count += 1;
        conditions.push(format!("customer_name ILIKE ${}", param_count));
    }

    let where_clause = conditions.join(" AND ");

    let query = format!(
        r#"
        SELECT {}
        FROM quotes
        WHERE {}
        ORDER BY created_at DESC
        LIMIT ${} OFFSET ${}
        "#,
        QUOTE_COLUMNS,
        where_clause,
        param_count + 1,
        param_count + 2
    );
    let count_query = format!("SELECT COUNT(*) FROM quotes WHERE {}", where_clause);

    let mut query_builder = sqlx::query_as::<_, Quote>(&query);
    let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);

    if let Some(id) = creator_id {
        query_builder = query_builder.bind(id);
        count_builder = count_builder.bind(id);
    }
    if let Some(status) = filter.status {
        query_builder = query_builder.bind(status);
        count_builder = count_builder.bind(status);
    }
    if let Some(pattern) = &customer {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }

    query_builder = query_builder.bind(page.limit()).bind(page.offset());

    let quotes = query_builder.fetch_all(pool).await?;
    let total = count_builder.fetch_one(pool).await?;

    Ok((quotes, total))
}

pub async fn update_quote(
    pool: &PgPool,
    quote_id: Uuid,
    req: &UpdateQuoteRequest,
) -> Result<Option<Quote>> {
    let query = format!(
        r#"
        UPDATE quotes
        SET
            customer_name = COALESCE($2, customer_name),
            customer_phone = COALESCE($3, customer_phone),
            customer_address = COALESCE($4, customer_address),
            currency = COALESCE($5, currency),
            tax_rate = COALESCE($6, tax_rate),
            note = COALESCE($7, note),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    );

    let quote = sqlx::query_as::<_, Quote>(&query)
        .bind(quote_id)
        .bind(req.customer_name.as_deref().map(str::trim))
        .bind(&req.customer_phone)
        .bind(&req.customer_address)
        .bind(&req.currency)
        .bind(req.tax_rate)
        .bind(&req.note)
        .fetch_optional(pool)
        .await?;

    Ok(quote)
}

pub async fn set_quote_status(pool: &PgPool, quote_id: Uuid, status: QuoteStatus) -> Result<Option<Quote>> {
    let query = format!(
        "UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        QUOTE_COLUMNS
    );
    let quote = sqlx::query_as::<_, Quote>(&query)
        .bind(quote_id)
        .bind(status)
        .fetch_optional(pool)
        .await?;

    Ok(quote)
}

pub async fn delete_quote(pool: &PgPool, quote_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM quotes WHERE id = $1")
        .bind(quote_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

async fn touch_quote(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    quote_id: Uuid,
) -> Result<()> {
    sqlx::query("UPDATE quotes SET updated_at = NOW() WHERE id = $1")
        .bind(quote_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

// =============================================================================
// Items
// =============================================================================

/// Quote lines in insertion order with the product columns used for display
pub async fn list_quote_item_views(pool: &PgPool, quote_id: Uuid) -> Result<Vec<QuoteItemView>> {
    let items = sqlx::query_as::<_, QuoteItemView>(
        r#"
        SELECT
            qi.id, qi.quote_id, qi.product_id, qi.quantity, qi.base_price,
            qi.row_delta, qi.row_amount, qi.display_price, qi.created_at,
            p.name AS product_name,
            p.spec AS product_spec,
            COALESCE(p.description, p.note) AS product_description,
            p.lead_days,
            (
                SELECT i.url FROM product_images i
                WHERE i.product_id = p.id
                ORDER BY i.sort ASC, i.created_at ASC
                LIMIT 1
            ) AS cover_url
        FROM quote_items qi
        JOIN products p ON p.id = qi.product_id
        WHERE qi.quote_id = $1
        ORDER BY qi.created_at ASC, qi.id ASC
        "#
    )
    .bind(quote_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Outcome of adding lines to a quote
#[derive(Debug)]
pub enum AddItemsOutcome {
    Added(Vec<QuoteItem>),
    QuoteNotFound,
    ProductNotFound(Uuid),
}

/// Add lines with their base price frozen from the current product price.
/// All lines are added or none.
pub async fn add_quote_items(
    pool: &PgPool,
    quote_id: Uuid,
    items: &[AddQuoteItem],
) -> Result<AddItemsOutcome> {
    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM quotes WHERE id = $1)")
        .bind(quote_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Ok(AddItemsOutcome::QuoteNotFound);
    }

    let query = format!(
        r#"
        INSERT INTO quote_items (
            id, quote_id, product_id, quantity, base_price, row_delta, row_amount,
            display_price, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp())
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );

    let mut added = Vec::with_capacity(items.len());
    for item in items {
        let price: Option<Decimal> = sqlx::query_scalar("SELECT price FROM products WHERE id = $1")
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(base_price) = price else {
            return Ok(AddItemsOutcome::ProductNotFound(item.product_id));
        };

        let line = sqlx::query_as::<_, QuoteItem>(&query)
            .bind(Uuid::new_v4())
            .bind(quote_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(base_price)
            .bind(item.row_delta)
            .bind(item.row_amount)
            .bind(display_price(base_price, item.row_delta, item.row_amount))
            .fetch_one(&mut *tx)
            .await?;
        added.push(line);
    }

    touch_quote(&mut tx, quote_id).await?;
    tx.commit().await?;
    Ok(AddItemsOutcome::Added(added))
}

/// Apply changes to a line and recompute its display price
pub async fn update_quote_item(
    pool: &PgPool,
    item_id: Uuid,
    req: &UpdateQuoteItemRequest,
) -> Result<Option<QuoteItem>> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {} FROM quote_items WHERE id = $1 FOR UPDATE", ITEM_COLUMNS);
    let current = sqlx::query_as::<_, QuoteItem>(&query)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(current) = current else {
        return Ok(None);
    };

    let quantity = req.quantity.unwrap_or(current.quantity);
    let row_delta = req.row_delta.unwrap_or(current.row_delta);
    let row_amount = req.row_amount.unwrap_or(current.row_amount);
    let price = display_price(current.base_price, row_delta, row_amount);

    let query = format!(
        r#"
        UPDATE quote_items
        SET quantity = $2, row_delta = $3, row_amount = $4, display_price = $5
        WHERE id = $1
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let item = sqlx::query_as::<_, QuoteItem>(&query)
        .bind(item_id)
        .bind(quantity)
        .bind(row_delta)
        .bind(row_amount)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

    touch_quote(&mut tx, item.quote_id).await?;
    tx.commit().await?;
    Ok(Some(item))
}

/// Remove a line, returning it
pub async fn delete_quote_item(pool: &PgPool, item_id: Uuid) -> Result<Option<QuoteItem>> {
    let mut tx = pool.begin().await?;

    let query = format!("DELETE FROM quote_items WHERE id = $1 RETURNING {}", ITEM_COLUMNS);
    let item = sqlx::query_as::<_, QuoteItem>(&query)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(item) = &item {
        touch_quote(&mut tx, item.quote_id).await?;
    }
    tx.commit().await?;
    Ok(item)
}
