//! Multipart form reading shared by upload endpoints

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;

use crate::error::{ApiResult, AppError};

/// Uploaded file part
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A parsed multipart form: the `file` part plus plain text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// The uploaded file, or a validation error when the form has none
    pub fn require_file(&mut self) -> ApiResult<UploadedFile> {
        match self.file.take() {
            Some(file) if !file.bytes.is_empty() => Ok(file),
            _ => Err(AppError::validation("请上传文件")),
        }
    }

    /// Non-blank text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Accept only image uploads
pub fn ensure_image(file: &UploadedFile) -> ApiResult<()> {
    let by_type = file
        .content_type
        .as_deref()
        .is_some_and(|t| t.starts_with("image/"));
    let ext = file.file_name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    let by_ext = matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg");
    if by_type || by_ext {
        Ok(())
    } else {
        Err(AppError::validation("仅支持图片文件"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: Option<&str>) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn test_ensure_image() {
        assert!(ensure_image(&file("logo.PNG", None)).is_ok());
        assert!(ensure_image(&file("blob", Some("image/jpeg"))).is_ok());
        assert!(ensure_image(&file("data.csv", Some("text/csv"))).is_err());
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let mut form = UploadForm::default();
        form.fields.insert("mode".to_string(), "  ".to_string());
        form.fields.insert("supplierId".to_string(), " abc ".to_string());
        assert_eq!(form.field("mode"), None);
        assert_eq!(form.field("supplierId"), Some("abc"));
        assert!(form.require_file().is_err());
    }
}
