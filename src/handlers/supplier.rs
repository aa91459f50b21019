//! Supplier endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::error::{ApiResult, AppError};
use crate::types::{
    entity, AuditAction, AuditEntry, CreateSupplierRequest, OkResponse, PageRequest, Paginated,
    Supplier, SupplierDetail, SupplierListQuery, UpdateSupplierRequest,
};

/// Products shown on the supplier detail page
const DETAIL_PRODUCT_LIMIT: i64 = 10;

fn require_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("供应商名称不能为空"));
    }
    Ok(())
}

/// GET /api/suppliers
pub async fn handle_list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<SupplierListQuery>,
) -> ApiResult<Json<Paginated<Supplier>>> {
    let page = PageRequest::new(filter.page, filter.page_size);
    let (items, total) = queries::supplier::list_suppliers(&state.pool, &filter, page).await?;
    Ok(Json(Paginated::new(items, total, page)))
}

/// GET /api/suppliers/:id
pub async fn handle_get(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SupplierDetail>> {
    let supplier = queries::supplier::get_supplier(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("供应商不存在"))?;
    let products =
        queries::product::list_supplier_products(&state.pool, id, DETAIL_PRODUCT_LIMIT).await?;

    Ok(Json(SupplierDetail { supplier, products }))
}

/// POST /api/suppliers
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSupplierRequest>,
) -> ApiResult<(StatusCode, Json<Supplier>)> {
    require_name(&req.name)?;
    if queries::supplier::supplier_name_taken(&state.pool, &req.name, None).await? {
        return Err(AppError::conflict("供应商名称已存在"));
    }

    let supplier = queries::supplier::create_supplier(&state.pool, &req).await?;
    info!(supplier_id = %supplier.id, name = %supplier.name, "Supplier created");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Create, entity::SUPPLIER)
                .entity_id(supplier.id)
                .summary(format!("创建供应商 {}", supplier.name)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(supplier)))
}

/// PATCH /api/suppliers/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSupplierRequest>,
) -> ApiResult<Json<Supplier>> {
    if let Some(name) = req.name.as_deref() {
        require_name(name)?;
        if queries::supplier::supplier_name_taken(&state.pool, name, Some(id)).await? {
            return Err(AppError::conflict("供应商名称已存在"));
        }
    }

    let supplier = queries::supplier::update_supplier(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::not_found("供应商不存在"))?;

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Update, entity::SUPPLIER).entity_id(id))
        .await;

    Ok(Json(supplier))
}

/// DELETE /api/suppliers/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    user.require_owner()?;

    if !queries::supplier::delete_supplier(&state.pool, id).await? {
        return Err(AppError::not_found("供应商不存在"));
    }
    info!(supplier_id = %id, "Supplier deleted");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Delete, entity::SUPPLIER).entity_id(id))
        .await;

    Ok(Json(OkResponse::ok()))
}
