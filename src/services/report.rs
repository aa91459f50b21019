//! Row-error report for finished imports

use anyhow::Result;
use uuid::Uuid;

use crate::services::storage::UploadStorage;
use crate::types::RowError;

const REPORT_HEADER: [&str; 4] = ["行号", "错误码", "字段", "错误信息"];

pub fn report_file_name(job_id: Uuid) -> String {
    format!("import-report-{job_id}.csv")
}

/// One CSV line per error. Line breaks inside messages become spaces.
pub fn render_error_report(errors: &[RowError]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(REPORT_HEADER)?;
    for error in errors {
        let message = flatten_lines(&error.message);
        writer.write_record([
            error.row.to_string().as_str(),
            error.code.as_str(),
            error.field.as_deref().unwrap_or(""),
            message.as_str(),
        ])?;
    }

    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

fn flatten_lines(message: &str) -> String {
    message.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Write the report for `job_id` and return its name relative to the upload root
pub async fn write_error_report(
    storage: &UploadStorage,
    job_id: Uuid,
    errors: &[RowError],
) -> Result<String> {
    let name = report_file_name(job_id);
    let bytes = render_error_report(errors)?;
    storage.write(&name, &bytes).await?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowErrorCode;

    #[test]
    fn test_report_layout() {
        let errors = vec![
            RowError {
                row: 2,
                code: RowErrorCode::Required,
                field: Some("name/spec/price".to_string()),
                message: "缺少必填字段：名称、规格或单价".to_string(),
            },
            RowError {
                row: 5,
                code: RowErrorCode::Duplicate,
                field: None,
                message: "产品已存在，跳过".to_string(),
            },
        ];
        let text = String::from_utf8(render_error_report(&errors).unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "行号,错误码,字段,错误信息");
        assert_eq!(lines[1], "2,REQUIRED,name/spec/price,缺少必填字段：名称、规格或单价");
        assert_eq!(lines[2], "5,DUPLICATE,,产品已存在，跳过");
    }

    #[test]
    fn test_multiline_messages_stay_on_one_line() {
        let errors = vec![RowError {
            row: 9,
            code: RowErrorCode::Unknown,
            field: None,
            message: "database error\nconnection reset\r\nretry later".to_string(),
        }];
        let text = String::from_utf8(render_error_report(&errors).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("database error connection reset retry later"));
    }

    #[tokio::test]
    async fn test_write_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path());
        let job_id = Uuid::new_v4();

        let name = write_error_report(&storage, job_id, &[]).await.unwrap();
        assert_eq!(name, format!("import-report-{job_id}.csv"));
        assert!(storage.exists(&name).await);
    }
}
