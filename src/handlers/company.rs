//! Company profile (quote letterhead) endpoints

use axum::extract::{Multipart, State};
use axum::Json;
use tracing::{info, warn};

use super::upload::{ensure_image, UploadForm};
use super::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::error::ApiResult;
use crate::services::storage::{name_from_public_url, public_url};
use crate::types::{
    entity, AuditAction, AuditEntry, CompanyProfile, UpdateCompanyProfileRequest,
};

/// GET /api/company-profile (public)
pub async fn handle_get(State(state): State<AppState>) -> ApiResult<Json<CompanyProfile>> {
    let profile = queries::company::get_or_create_profile(&state.pool).await?;
    Ok(Json(profile))
}

/// PUT /api/company-profile
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateCompanyProfileRequest>,
) -> ApiResult<Json<CompanyProfile>> {
    user.require_owner()?;

    let profile = queries::company::update_profile(&state.pool, &req).await?;
    info!(user_id = %user.id, "Company profile updated");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Update, entity::COMPANY_PROFILE).entity_id(1))
        .await;

    Ok(Json(profile))
}

/// POST /api/company-profile/logo
pub async fn handle_upload_logo(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<CompanyProfile>> {
    user.require_owner()?;

    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    ensure_image(&file)?;

    let previous = queries::company::get_or_create_profile(&state.pool).await?.logo_url;
    let name = state.storage().save("logo", &file.file_name, &file.bytes).await?;
    let req = UpdateCompanyProfileRequest {
        logo_url: Some(public_url(&name)),
        ..Default::default()
    };
    let profile = queries::company::update_profile(&state.pool, &req).await?;
    info!(file = %name, "Company logo uploaded");

    if let Some(old) = previous.as_deref().and_then(name_from_public_url) {
        if let Err(e) = state.storage().remove(old).await {
            warn!("Failed to remove previous logo: {:#}", e);
        }
    }

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Update, entity::COMPANY_PROFILE)
                .entity_id(1)
                .summary("更新公司标志"),
        )
        .await;

    Ok(Json(profile))
}
