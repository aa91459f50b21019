//! Product endpoints

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::upload::{ensure_image, UploadForm};
use super::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::error::{ApiResult, AppError};
use crate::services::storage::{name_from_public_url, public_url};
use crate::types::{
    entity, AuditAction, AuditEntry, CreateProductRequest, ImageUploadQuery, OkResponse,
    PageRequest, Paginated, Product, ProductDetail, ProductImage, ProductListItem,
    ProductListQuery, UpdateProductRequest,
};

fn validate_fields(name: Option<&str>, spec: Option<&str>, price: Option<Decimal>) -> ApiResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("产品名称不能为空"));
    }
    if spec.is_some_and(|s| s.trim().is_empty()) {
        return Err(AppError::validation("规格不能为空"));
    }
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::validation("价格不能为负数"));
    }
    Ok(())
}

/// GET /api/products
pub async fn handle_list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<ProductListQuery>,
) -> ApiResult<Json<Paginated<ProductListItem>>> {
    let page = PageRequest::new(filter.page, filter.page_size);
    let (items, total) = queries::product::list_products(&state.pool, &filter, page).await?;
    Ok(Json(Paginated::new(items, total, page)))
}

/// GET /api/products/:id
pub async fn handle_get(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProductDetail>> {
    let product = queries::product::get_product(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("产品不存在"))?;
    let supplier = queries::supplier::get_supplier(&state.pool, product.supplier_id)
        .await?
        .ok_or_else(|| AppError::not_found("供应商不存在"))?;
    let images = queries::product::list_product_images(&state.pool, id).await?;
    let price_history = queries::product::list_price_history(
        &state.pool,
        id,
        queries::product::PRICE_HISTORY_LIMIT,
    )
    .await?;

    Ok(Json(ProductDetail {
        product,
        supplier,
        images,
        price_history,
    }))
}

/// POST /api/products
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    validate_fields(Some(req.name.as_str()), Some(req.spec.as_str()), Some(req.price))?;
    if !queries::supplier::supplier_exists(&state.pool, req.supplier_id).await? {
        return Err(AppError::not_found("供应商不存在"));
    }

    let product = queries::product::create_product(&state.pool, &req).await?;
    info!(product_id = %product.id, supplier_id = %product.supplier_id, "Product created");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Create, entity::PRODUCT)
                .entity_id(product.id)
                .summary(format!("创建产品 {} {}", product.name, product.spec)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /api/products/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    validate_fields(req.name.as_deref(), req.spec.as_deref(), req.price)?;

    let changed_by = user.id.to_string();
    let product = queries::product::update_product(&state.pool, id, &req, &changed_by)
        .await?
        .ok_or_else(|| AppError::not_found("产品不存在"))?;

    let mut entry = AuditEntry::new(Some(user.id), AuditAction::Update, entity::PRODUCT).entity_id(id);
    if let Some(price) = req.price {
        entry = entry.summary(format!("价格 {}", price));
    }
    state.audit(entry).await;

    Ok(Json(product))
}

/// DELETE /api/products/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    user.require_owner()?;

    let images = queries::product::list_product_images(&state.pool, id).await?;
    if !queries::product::delete_product(&state.pool, id).await? {
        return Err(AppError::not_found("产品不存在"));
    }
    for image in &images {
        remove_local_image(&state, image).await;
    }
    info!(product_id = %id, images = images.len(), "Product deleted");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Delete, entity::PRODUCT).entity_id(id))
        .await;

    Ok(Json(OkResponse::ok()))
}

/// POST /api/products/:id/images
pub async fn handle_upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ImageUploadQuery>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ProductImage>)> {
    if queries::product::get_product(&state.pool, id).await?.is_none() {
        return Err(AppError::not_found("产品不存在"));
    }

    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    ensure_image(&file)?;

    let name = state.storage().save("product", &file.file_name, &file.bytes).await?;
    let image = queries::product::add_product_image(
        &state.pool,
        id,
        &public_url(&name),
        query.sort.unwrap_or(0),
    )
    .await?;
    info!(product_id = %id, image_id = %image.id, size = file.bytes.len(), "Product image uploaded");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Create, entity::PRODUCT_IMAGE)
                .entity_id(image.id)
                .summary(format!("产品 {}", id)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(image)))
}

/// DELETE /api/products/images/:image_id
pub async fn handle_delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    let image = queries::product::delete_product_image(&state.pool, image_id)
        .await?
        .ok_or_else(|| AppError::not_found("图片不存在"))?;
    remove_local_image(&state, &image).await;

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Delete, entity::PRODUCT_IMAGE)
                .entity_id(image_id)
                .summary(format!("产品 {}", image.product_id)),
        )
        .await;

    Ok(Json(OkResponse::ok()))
}

/// Remove the stored file behind an uploaded image. External URLs are left alone.
async fn remove_local_image(state: &AppState, image: &ProductImage) {
    let Some(name) = name_from_public_url(&image.url) else {
        return;
    };
    if let Err(e) = state.storage().remove(name).await {
        warn!(image_id = %image.id, "Failed to remove image file: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fields() {
        assert!(validate_fields(Some("A4纸"), Some("70g"), Some(Decimal::new(2350, 2))).is_ok());
        assert!(validate_fields(Some("  "), None, None).is_err());
        assert!(validate_fields(None, Some(""), None).is_err());
        assert!(validate_fields(None, None, Some(Decimal::new(-1, 0))).is_err());
        assert!(validate_fields(None, None, None).is_ok());
    }
}
