//! Login, logout and password endpoints

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use super::AppState;
use crate::auth::{self, AuthUser};
use crate::db::queries;
use crate::error::{ApiResult, AppError};
use crate::types::{
    entity, AuditAction, AuditEntry, ChangePasswordRequest, LoginRequest, LoginResponse,
    OkResponse, UserPublic, UserStatus,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn validate_new_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!("新密码至少 {} 位", MIN_PASSWORD_LENGTH)));
    }
    Ok(())
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    let email = auth::normalize_email(&req.email);
    let email = email.as_str();
    let invalid = || AppError::unauthorized("邮箱或密码错误");

    let Some(user) = queries::user::get_user_by_email(&state.pool, email).await? else {
        warn!(email, "Login failed: unknown user");
        return Err(invalid());
    };
    if user.status != UserStatus::Active {
        warn!(email, "Login refused: account disabled");
        return Err(invalid());
    }
    if !auth::verify_password(&req.password, &user.password_hash)? {
        warn!(email, "Login failed: wrong password");
        return Err(invalid());
    }

    let token = auth::generate_token(user.id, &user.email, user.role, &state.config.jwt_secret)?;
    info!(user_id = %user.id, "User logged in");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Login, entity::USER).entity_id(user.id))
        .await;

    let cookie = auth::auth_cookie(&token, state.config.cookie_secure);
    let body = LoginResponse {
        access_token: token,
        user: UserPublic::from(user),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/logout
pub async fn handle_logout(State(state): State<AppState>, user: AuthUser) -> Response {
    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Logout, entity::USER).entity_id(user.id))
        .await;

    let cookie = auth::clear_auth_cookie(state.config.cookie_secure);
    ([(SET_COOKIE, cookie)], Json(OkResponse::ok())).into_response()
}

/// GET /api/auth/me
pub async fn handle_me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserPublic>> {
    let user = queries::user::get_user(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;
    Ok(Json(user.into()))
}

/// POST /api/auth/change-password
pub async fn handle_change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<OkResponse>> {
    let current = queries::user::get_user(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))?;

    if !auth::verify_password(&req.current_password, &current.password_hash)? {
        return Err(AppError::validation("当前密码不正确"));
    }
    validate_new_password(&req.new_password)?;

    let hash = auth::hash_password(&req.new_password)?;
    queries::user::update_password(&state.pool, user.id, &hash).await?;
    info!(user_id = %user.id, "Password changed");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::ChangePassword, entity::USER)
                .entity_id(user.id),
        )
        .await;

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_key_matches_stored_email() {
        let stored = crate::handlers::user::validated_email("Boss@Example.com").unwrap();
        assert_eq!(auth::normalize_email(" Boss@Example.com "), stored);
        assert_eq!(auth::normalize_email("BOSS@EXAMPLE.COM"), stored);
    }

    #[test]
    fn test_new_password_length() {
        assert!(validate_new_password("1234567").is_err());
        assert!(validate_new_password("12345678").is_ok());
        assert!(validate_new_password("密码密码密码密码").is_ok());
    }
}
