//! HTTP error type shared by all handlers

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::services::import_pipeline::ImportError;
use crate::services::spreadsheet::SpreadsheetError;
use crate::types::ErrorResponse;

/// Postgres SQLSTATE for unique violations
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// SQLSTATE of the database error behind `err`, if any
fn sql_state(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .and_then(|e| match e {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        })
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match sql_state(&err).as_deref() {
            Some(UNIQUE_VIOLATION) => AppError::conflict("记录已存在"),
            Some(FOREIGN_KEY_VIOLATION) => AppError::conflict("存在关联数据，无法完成操作"),
            _ => AppError::Internal(err),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::from(anyhow::Error::from(err))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(format!("上传数据无效: {}", err.body_text()))
    }
}

impl From<SpreadsheetError> for AppError {
    fn from(err: SpreadsheetError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Spreadsheet(e) => e.into(),
            ImportError::Internal(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "服务器内部错误".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::validation("x").status_and_code().0, StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("x").status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("x").status_and_code().0, StatusCode::CONFLICT);
        assert_eq!(AppError::forbidden("x").status_and_code().0, StatusCode::FORBIDDEN);
        assert_eq!(AppError::unauthorized("x").status_and_code().0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_plain_anyhow_is_internal() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_spreadsheet_error_is_validation() {
        let err: AppError = SpreadsheetError::EmptyOrMalformedFile.into();
        assert!(matches!(err, AppError::Validation(ref m) if m == "文件为空或格式不正确"));
    }
}
