//! Interactive owner account management.

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::normalize_email;
use crate::db::queries;

const MIN_PASSWORD_LENGTH: usize = 12;

/// Prompt for a password interactively (hidden input), confirm, hash, and
/// upsert the owner account in the database.
pub async fn create_admin_interactive(pool: &PgPool, email: &str) -> Result<()> {
    let email = normalize_email(email);
    let email = email.as_str();
    validate_email(email)?;

    let password = prompt_password()?;
    validate_password(&password)?;

    let hash = crate::auth::hash_password(&password)?;

    queries::user::upsert_owner(pool, email, &hash)
        .await
        .context("Failed to upsert owner account")?;

    println!("Owner account ready: {email}");
    Ok(())
}

/// Prompt for a new password for an existing account and re-activate it.
pub async fn reset_admin_interactive(pool: &PgPool, email: &str) -> Result<()> {
    let email = normalize_email(email);
    let email = email.as_str();
    if queries::user::get_user_by_email(pool, email).await?.is_none() {
        bail!("No account with email {email}");
    }

    let password = prompt_password()?;
    validate_password(&password)?;

    let hash = crate::auth::hash_password(&password)?;
    queries::user::reset_user_password(pool, email, &hash).await?;

    println!("Password reset for {email}");
    Ok(())
}

/// Startup seeding: create the owner from ADMIN_EMAIL / ADMIN_PASSWORD_HASH
/// when that email does not exist yet. Existing accounts are left alone.
pub async fn ensure_admin_from_env(pool: &PgPool, seed: Option<&(String, String)>) {
    let Some((email, hash)) = seed else {
        return;
    };

    if !hash.starts_with("$argon2") {
        warn!("ADMIN_PASSWORD_HASH is not an argon2 hash, skipping owner seeding");
        return;
    }

    let email = normalize_email(email);
    match queries::user::create_owner_if_missing(pool, &email, hash).await {
        Ok(true) => info!("Owner account {email} created from ADMIN_PASSWORD_HASH"),
        Ok(false) => {}
        Err(e) => warn!("Failed to apply ADMIN_PASSWORD_HASH: {e}"),
    }
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Owner password: ").context("cannot read password")?;
    let repeated = rpassword::prompt_password("Repeat password: ").context("cannot read password")?;
    if password != repeated {
        bail!("Passwords differ, nothing was changed");
    }
    Ok(password)
}

fn validate_email(email: &str) -> Result<()> {
    if !email.contains('@') || !email.contains('.') {
        bail!("Invalid email address: {email}");
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        bail!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters (got {})",
            password.chars().count()
        );
    }
    let classes = [
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
    ];
    if classes.contains(&false) {
        bail!("Owner passwords mix upper case, lower case and digits");
    }
    Ok(())
}
