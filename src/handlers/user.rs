//! User management endpoints (owner only)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use super::auth::validate_new_password;
use super::AppState;
use crate::auth::{hash_password, normalize_email, AuthUser};
use crate::db::queries;
use crate::error::{ApiResult, AppError};
use crate::types::{
    entity, AuditAction, AuditEntry, CreateUserRequest, ItemsResponse, OkResponse,
    ResetPasswordRequest, UpdateUserRequest, UserPublic, UserRole, UserStatus,
};

/// Normalized email, rejected when it is not an address
pub(super) fn validated_email(email: &str) -> ApiResult<String> {
    let email = normalize_email(email);
    if !email.contains('@') {
        return Err(AppError::validation("邮箱格式不正确"));
    }
    Ok(email)
}

/// GET /api/users
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ItemsResponse<UserPublic>>> {
    user.require_owner()?;
    let users = queries::user::list_users(&state.pool).await?;
    Ok(Json(ItemsResponse {
        items: users.into_iter().map(UserPublic::from).collect(),
    }))
}

/// GET /api/users/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserPublic>> {
    user.require_owner()?;
    let found = queries::user::get_user(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    Ok(Json(found.into()))
}

/// POST /api/users
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserPublic>)> {
    user.require_owner()?;
    let email = validated_email(&req.email)?;
    validate_new_password(&req.password)?;

    if queries::user::get_user_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::conflict("邮箱已被使用"));
    }

    let hash = hash_password(&req.password)?;
    let created = queries::user::create_user(
        &state.pool,
        &email,
        &hash,
        req.name.as_deref(),
        req.role.unwrap_or(UserRole::Assistant),
        req.status.unwrap_or(UserStatus::Active),
    )
    .await?;
    info!(user_id = %created.id, "User created");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Create, entity::USER)
                .entity_id(created.id)
                .summary(format!("创建用户 {}", created.email)),
        )
        .await;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// PATCH /api/users/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserPublic>> {
    user.require_owner()?;

    if let Some(email) = req.email.as_deref() {
        let email = validated_email(email)?;
        if let Some(other) = queries::user::get_user_by_email(&state.pool, &email).await? {
            if other.id != id {
                return Err(AppError::conflict("邮箱已被使用"));
            }
        }
        req.email = Some(email);
    }

    let updated = queries::user::update_user(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Update, entity::USER).entity_id(id))
        .await;

    Ok(Json(updated.into()))
}

/// DELETE /api/users/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    user.require_owner()?;
    if id == user.id {
        return Err(AppError::validation("不能删除当前登录的账号"));
    }

    if !queries::user::delete_user(&state.pool, id).await? {
        return Err(AppError::not_found("用户不存在"));
    }
    info!(user_id = %id, "User deleted");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Delete, entity::USER).entity_id(id))
        .await;

    Ok(Json(OkResponse::ok()))
}

/// POST /api/users/:id/reset-password
pub async fn handle_reset_password(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<OkResponse>> {
    user.require_owner()?;
    validate_new_password(&req.password)?;

    let hash = hash_password(&req.password)?;
    if !queries::user::update_password(&state.pool, id, &hash).await? {
        return Err(AppError::not_found("用户不存在"));
    }

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::ResetPassword, entity::USER).entity_id(id),
        )
        .await;

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_email() {
        assert_eq!(validated_email(" Boss@Example.com ").unwrap(), "boss@example.com");
        assert!(validated_email("nobody").is_err());
    }
}
