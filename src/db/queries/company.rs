//! Company profile queries

use sqlx::PgPool;
use anyhow::Result;

use crate::types::company::{
    CompanyProfile, UpdateCompanyProfileRequest, DEFAULT_COMPANY_NAME_CN, DEFAULT_COMPANY_NAME_EN,
};

/// Load the profile, creating the default row on first access
pub async fn get_or_create_profile(pool: &PgPool) -> Result<CompanyProfile> {
    sqlx::query(
        r#"
        INSERT INTO company_profile (id, name_cn, name_en, updated_at)
        VALUES (1, $1, $2, NOW())
        ON CONFLICT (id) DO NOTHING
        "#
    )
    .bind(DEFAULT_COMPANY_NAME_CN)
    .bind(DEFAULT_COMPANY_NAME_EN)
    .execute(pool)
    .await?;

    let profile = sqlx::query_as::<_, CompanyProfile>(
        r#"
        SELECT name_cn, name_en, logo_url, bank_account, bank_name, phone, updated_at
        FROM company_profile
        WHERE id = 1
        "#
    )
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

pub async fn update_profile(pool: &PgPool, req: &UpdateCompanyProfileRequest) -> Result<CompanyProfile> {
    get_or_create_profile(pool).await?;

    let profile = sqlx::query_as::<_, CompanyProfile>(
        r#"
        UPDATE company_profile
        SET
            name_cn = COALESCE($1, name_cn),
            name_en = COALESCE($2, name_en),
            logo_url = COALESCE($3, logo_url),
            bank_account = COALESCE($4, bank_account),
            bank_name = COALESCE($5, bank_name),
            phone = COALESCE($6, phone),
            updated_at = NOW()
        WHERE id = 1
        RETURNING name_cn, name_en, logo_url, bank_account, bank_name, phone, updated_at
        "#
    )
    .bind(&req.name_cn)
    .bind(&req.name_en)
    .bind(&req.logo_url)
    .bind(&req.bank_account)
    .bind(&req.bank_name)
    .bind(&req.phone)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}
