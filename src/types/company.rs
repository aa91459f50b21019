//! Company profile (letterhead) types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_COMPANY_NAME_CN: &str = "公司名称";
pub const DEFAULT_COMPANY_NAME_EN: &str = "Company Name";

/// Singleton letterhead record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name_cn: String,
    pub name_en: String,
    pub logo_url: Option<String>,
    pub bank_account: String,
    pub bank_name: String,
    pub phone: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyProfileRequest {
    pub name_cn: Option<String>,
    pub name_en: Option<String>,
    pub logo_url: Option<String>,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
    pub phone: Option<String>,
}
