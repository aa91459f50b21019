//! Quote endpoints, including PDF export

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use super::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::db::queries::quote::AddItemsOutcome;
use crate::error::{ApiResult, AppError};
use crate::services::pdf::{inline_images, render_quote_html};
use crate::services::pricing::quote_totals;
use crate::services::quote_code::{local_day_start, next_quote_code};
use crate::types::{
    entity, AddQuoteItem, AuditAction, AuditEntry, CreateQuoteRequest, OkResponse, PageRequest,
    Paginated, Quote, QuoteDetail, QuoteItem, QuoteListQuery, QuoteStatus, UpdateQuoteItemRequest,
    UpdateQuoteRequest,
};

fn quote_not_found() -> AppError {
    AppError::not_found("报价单不存在")
}

fn validate_tax_rate(rate: Option<Decimal>) -> ApiResult<()> {
    if rate.is_some_and(|r| r.is_sign_negative()) {
        return Err(AppError::validation("税率不能为负数"));
    }
    Ok(())
}

fn validate_items(items: &[AddQuoteItem]) -> ApiResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("请选择要添加的产品"));
    }
    if items.iter().any(|i| i.quantity < 1) {
        return Err(AppError::validation("数量必须大于 0"));
    }
    Ok(())
}

/// Quote with ordered lines and computed totals
async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<QuoteDetail> {
    let quote = queries::quote::get_quote(&state.pool, id)
        .await?
        .ok_or_else(quote_not_found)?;
    let items = queries::quote::list_quote_item_views(&state.pool, id).await?;
    let totals = quote_totals(
        items.iter().map(|i| (i.item.display_price, i.item.quantity)),
        quote.tax_rate,
    );

    Ok(QuoteDetail { quote, items, totals })
}

/// GET /api/quotes
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<QuoteListQuery>,
) -> ApiResult<Json<Paginated<Quote>>> {
    let page = PageRequest::new(filter.page, filter.page_size);
    let creator = filter.only_mine.unwrap_or(false).then_some(user.id);
    let (items, total) = queries::quote::list_quotes(&state.pool, &filter, creator, page).await?;
    Ok(Json(Paginated::new(items, total, page)))
}

/// GET /api/quotes/:id
pub async fn handle_get(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuoteDetail>> {
    Ok(Json(load_detail(&state, id).await?))
}

/// POST /api/quotes
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateQuoteRequest>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    if req.customer_name.trim().is_empty() {
        return Err(AppError::validation("客户名称不能为空"));
    }
    validate_tax_rate(req.tax_rate)?;

    let now = Local::now();
    let created_today = queries::quote::count_quotes_since(&state.pool, local_day_start(now)).await?;
    let code = next_quote_code(now, created_today);

    let quote = queries::quote::create_quote(&state.pool, &code, user.id, &req).await?;
    info!(quote_id = %quote.id, code = %quote.code, "Quote created");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Create, entity::QUOTE)
                .entity_id(quote.id)
                .summary(format!("{} {}", quote.code, quote.customer_name)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(quote)))
}

/// PATCH /api/quotes/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateQuoteRequest>,
) -> ApiResult<Json<Quote>> {
    if req.customer_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("客户名称不能为空"));
    }
    validate_tax_rate(req.tax_rate)?;

    let quote = queries::quote::update_quote(&state.pool, id, &req)
        .await?
        .ok_or_else(quote_not_found)?;

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Update, entity::QUOTE).entity_id(id))
        .await;

    Ok(Json(quote))
}

/// DELETE /api/quotes/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    user.require_owner()?;

    if !queries::quote::delete_quote(&state.pool, id).await? {
        return Err(quote_not_found());
    }
    info!(quote_id = %id, "Quote deleted");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Delete, entity::QUOTE).entity_id(id))
        .await;

    Ok(Json(OkResponse::ok()))
}

/// POST /api/quotes/:id/items
pub async fn handle_add_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(items): Json<Vec<AddQuoteItem>>,
) -> ApiResult<(StatusCode, Json<Vec<QuoteItem>>)> {
    validate_items(&items)?;

    let added = match queries::quote::add_quote_items(&state.pool, id, &items).await? {
        AddItemsOutcome::Added(added) => added,
        AddItemsOutcome::QuoteNotFound => return Err(quote_not_found()),
        AddItemsOutcome::ProductNotFound(product_id) => {
            return Err(AppError::not_found(format!("产品不存在: {}", product_id)))
        }
    };
    info!(quote_id = %id, count = added.len(), "Quote items added");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::AddItems, entity::QUOTE)
                .entity_id(id)
                .summary(format!("添加 {} 个明细", added.len())),
        )
        .await;

    Ok((StatusCode::CREATED, Json(added)))
}

/// PATCH /api/quotes/items/:item_id
pub async fn handle_update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateQuoteItemRequest>,
) -> ApiResult<Json<QuoteItem>> {
    if req.quantity.is_some_and(|q| q < 1) {
        return Err(AppError::validation("数量必须大于 0"));
    }

    let item = queries::quote::update_quote_item(&state.pool, item_id, &req)
        .await?
        .ok_or_else(|| AppError::not_found("报价明细不存在"))?;

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::UpdateItem, entity::QUOTE)
                .entity_id(item.quote_id)
                .summary(format!("明细 {}", item.id)),
        )
        .await;

    Ok(Json(item))
}

/// DELETE /api/quotes/items/:item_id
pub async fn handle_remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    let item = queries::quote::delete_quote_item(&state.pool, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("报价明细不存在"))?;

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::RemoveItem, entity::QUOTE)
                .entity_id(item.quote_id)
                .summary(format!("明细 {}", item.id)),
        )
        .await;

    Ok(Json(OkResponse::ok()))
}

/// PATCH /api/quotes/:id/mark-exported
pub async fn handle_mark_exported(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Quote>> {
    let quote = queries::quote::set_quote_status(&state.pool, id, QuoteStatus::Exported)
        .await?
        .ok_or_else(quote_not_found)?;

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Export, entity::QUOTE).entity_id(id))
        .await;

    Ok(Json(quote))
}

/// GET /api/quotes/:id/export
pub async fn handle_export_pdf(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let detail = load_detail(&state, id).await?;
    let company = queries::company::get_or_create_profile(&state.pool).await?;

    let sources = inline_images(state.storage(), &detail, &company).await;
    let html = render_quote_html(&detail, &company, &sources);
    let pdf = state.pdf.render(&html).await.map_err(|e| {
        error!(quote_id = %id, "PDF rendering failed: {:#}", e);
        AppError::Internal(e)
    })?;

    queries::quote::set_quote_status(&state.pool, id, QuoteStatus::Exported).await?;
    info!(quote_id = %id, code = %detail.quote.code, size = pdf.len(), "Quote exported to PDF");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Export, entity::QUOTE)
                .entity_id(id)
                .summary(format!("导出 {}.pdf", detail.quote.code)),
        )
        .await;

    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, attachment_header(&detail.quote.code)),
        ],
        pdf,
    )
        .into_response())
}

/// `Content-Disposition` value for `{code}.pdf`
fn attachment_header(code: &str) -> String {
    let file_name: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    format!("attachment; filename=\"{}.pdf\"", file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32) -> AddQuoteItem {
        AddQuoteItem {
            product_id: Uuid::new_v4(),
            quantity,
            row_delta: Decimal::ZERO,
            row_amount: Decimal::ZERO,
        }
    }

    #[test]
    fn test_validate_items() {
        assert!(validate_items(&[]).is_err());
        assert!(validate_items(&[item(1), item(0)]).is_err());
        assert!(validate_items(&[item(3)]).is_ok());
    }

    #[test]
    fn test_attachment_header() {
        assert_eq!(
            attachment_header("QT202503010001"),
            "attachment; filename=\"QT202503010001.pdf\""
        );
        assert_eq!(attachment_header("a\"b"), "attachment; filename=\"ab.pdf\"");
    }

    #[test]
    fn test_negative_tax_rate_rejected() {
        assert!(validate_tax_rate(Some(Decimal::new(-5, 2))).is_err());
        assert!(validate_tax_rate(Some(Decimal::new(6, 2))).is_ok());
        assert!(validate_tax_rate(None).is_ok());
    }
}
