//! Product import endpoints: sync and queued imports, preview, templates and
//! job management.

use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use super::upload::UploadForm;
use super::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiResult, AppError};
use crate::services::field_mapper::parse_supplied_mapping;
use crate::services::import_pipeline::{self, ImportOptions};
use crate::services::report::report_file_name;
use crate::services::template::{
    csv_template, xlsx_template, CSV_TEMPLATE_FILE_NAME, XLSX_TEMPLATE_FILE_NAME,
};
use crate::types::{
    entity, AuditAction, AuditEntry, DuplicateMode, EnqueueResponse, ImportJob, ItemsResponse,
    JobStatusResponse, OkResponse, PreviewResponse, SuppliedMapping, SyncImportResponse,
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

fn job_not_found() -> AppError {
    AppError::not_found("导入任务不存在")
}

fn parse_mapping(form: &UploadForm) -> ApiResult<Option<SuppliedMapping>> {
    form.field("mapping")
        .map(|raw| {
            parse_supplied_mapping(raw).map_err(|_| AppError::validation("字段映射格式不正确"))
        })
        .transpose()
}

/// Options carried by the multipart fields next to the uploaded file
fn import_options(form: &UploadForm, actor_id: Uuid) -> ApiResult<ImportOptions> {
    let supplier_id = form
        .field("supplierId")
        .map(|raw| Uuid::parse_str(raw).map_err(|_| AppError::validation("供应商ID格式不正确")))
        .transpose()?;

    Ok(ImportOptions {
        supplier_id,
        mode: DuplicateMode::from_form(form.field("mode")),
        mapping: parse_mapping(form)?,
        actor_id: Some(actor_id),
    })
}

fn attachment(content_type: &str, file_name: &str, body: impl IntoResponse) -> Response {
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}

/// POST /api/import/products
pub async fn handle_import_sync(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<SyncImportResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    let options = import_options(&form, user.id)?;

    info!(file = %file.file_name, size = file.bytes.len(), user = %user.email, "Synchronous import requested");
    let response =
        import_pipeline::import_sync(&state.import, &file.file_name, &file.bytes, &options).await?;

    Ok(Json(response))
}

/// POST /api/import/products/async
pub async fn handle_import_async(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<EnqueueResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    let options = import_options(&form, user.id)?;

    let job_id = state.queue.enqueue(&file.file_name, &file.bytes, options).await?;
    info!(job_id = %job_id, file = %file.file_name, "Import job queued");

    Ok(Json(EnqueueResponse { job_id }))
}

/// POST /api/import/products/preview
pub async fn handle_preview(
    _user: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<PreviewResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    let mapping = parse_mapping(&form)?;

    let preview = import_pipeline::preview(&file.bytes, &file.file_name, mapping.as_ref())?;
    Ok(Json(preview))
}

/// GET /api/import/template/products
pub async fn handle_csv_template(_user: AuthUser) -> Response {
    attachment(CSV_CONTENT_TYPE, CSV_TEMPLATE_FILE_NAME, csv_template())
}

/// GET /api/import/template/products.xlsx
pub async fn handle_xlsx_template(_user: AuthUser) -> ApiResult<Response> {
    let bytes = xlsx_template()?;
    Ok(attachment(XLSX_CONTENT_TYPE, XLSX_TEMPLATE_FILE_NAME, bytes))
}

/// GET /api/import/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<ItemsResponse<ImportJob>>> {
    let items = state.queue.list().await?;
    Ok(Json(ItemsResponse { items }))
}

/// GET /api/import/jobs/:id
pub async fn handle_job_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.queue.status(id).await?.ok_or_else(job_not_found)?;
    Ok(Json(status))
}

/// POST /api/import/jobs/:id/cancel
pub async fn handle_cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    if !state.queue.cancel(id) {
        return Err(job_not_found());
    }
    info!(job_id = %id, user_id = %user.id, "Import job cancel requested");

    state
        .audit(
            AuditEntry::new(Some(user.id), AuditAction::Update, entity::IMPORT_JOB)
                .entity_id(id)
                .summary("取消导入任务"),
        )
        .await;

    Ok(Json(OkResponse::ok()))
}

/// DELETE /api/import/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    if !state.queue.delete(id).await? {
        return Err(job_not_found());
    }
    info!(job_id = %id, user_id = %user.id, "Import job removed");

    state
        .audit(AuditEntry::new(Some(user.id), AuditAction::Delete, entity::IMPORT_JOB).entity_id(id))
        .await;

    Ok(Json(OkResponse::ok()))
}

/// GET /api/import/jobs/:id/report
pub async fn handle_download_report(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let path = state
        .queue
        .report_path(id)
        .await?
        .ok_or_else(|| AppError::not_found("该任务没有错误报告"))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(job_id = %id, path = %path.display(), "Import report missing on disk");
            return Err(AppError::not_found("错误报告文件不存在"));
        }
        Err(e) => return Err(AppError::Internal(e.into())),
    };

    Ok(attachment(CSV_CONTENT_TYPE, &report_file_name(id), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        let mut form = UploadForm::default();
        for (k, v) in fields {
            form.fields.insert(k.to_string(), v.to_string());
        }
        form
    }

    #[test]
    fn test_import_options_from_fields() {
        let supplier = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let supplier_text = supplier.to_string();
        let options = import_options(
            &form(&[("supplierId", supplier_text.as_str()), ("mode", "update")]),
            actor,
        )
        .unwrap();
        assert_eq!(options.supplier_id, Some(supplier));
        assert_eq!(options.mode, DuplicateMode::Update);
        assert_eq!(options.actor_id, Some(actor));
        assert!(options.mapping.is_none());
    }

    #[test]
    fn test_invalid_supplier_id_rejected() {
        let result = import_options(&form(&[("supplierId", "abc")]), Uuid::new_v4());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_invalid_mapping_rejected() {
        let result = import_options(&form(&[("mapping", "{not json")]), Uuid::new_v4());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_fields_use_defaults() {
        let options = import_options(&form(&[("supplierId", " "), ("mode", "")]), Uuid::new_v4()).unwrap();
        assert!(options.supplier_id.is_none());
        assert_eq!(options.mode, DuplicateMode::Skip);
    }
}
