//! User database queries

use sqlx::PgPool;
use uuid::Uuid;
use anyhow::Result;

use crate::types::user::{UpdateUserRequest, User, UserRole, UserStatus};

/// Get user by ID
pub async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, name, role, status, created_at, updated_at
        FROM users
        WHERE id = $1
        "#
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Get user by email (for login)
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, name, role, status, created_at, updated_at
        FROM users
        WHERE LOWER(email) = LOWER($1)
        "#
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, name, role, status, created_at, updated_at
        FROM users
        ORDER BY created_at DESC
        "#
    )
    .fetch_all(pool)
    .await?;

    Ok(users)
}

pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    name: Option<&str>,
    role: UserRole,
    status: UserStatus,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, name, role, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
        RETURNING id, email, password_hash, name, role, status, created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Update profile fields; absent fields keep their value
pub async fn update_user(
    pool: &PgPool,
    user_id: Uuid,
    req: &UpdateUserRequest,
) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET
            email = COALESCE($2, email),
            name = COALESCE($3, name),
            role = COALESCE($4, role),
            status = COALESCE($5, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, email, password_hash, name, role, status, created_at, updated_at
        "#
    )
    .bind(user_id)
    .bind(&req.email)
    .bind(&req.name)
    .bind(req.role)
    .bind(req.status)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn update_password(pool: &PgPool, user_id: Uuid, password_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(user_id)
    .bind(password_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert or promote an owner account, re-activating it (CLI and startup seeding)
pub async fn upsert_owner(pool: &PgPool, email: &str, password_hash: &str) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, role, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'OWNER', 'ACTIVE', NOW(), NOW())
        ON CONFLICT (email) DO UPDATE
        SET password_hash = EXCLUDED.password_hash,
            role = 'OWNER',
            status = 'ACTIVE',
            updated_at = NOW()
        RETURNING id, email, password_hash, name, role, status, created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Insert an owner only when the email is not taken yet
pub async fn create_owner_if_missing(pool: &PgPool, email: &str, password_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, role, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'OWNER', 'ACTIVE', NOW(), NOW())
        ON CONFLICT (email) DO NOTHING
        "#
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Set a new password and re-activate the account
pub async fn reset_user_password(pool: &PgPool, email: &str, password_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, status = 'ACTIVE', updated_at = NOW()
        WHERE LOWER(email) = LOWER($1)
        "#
    )
    .bind(email)
    .bind(password_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
