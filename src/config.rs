//! Configuration management

use std::path::PathBuf;

use anyhow::{self, Context, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,

    /// JWT secret key for token signing/validation
    pub jwt_secret: String,

    pub server_host: String,
    pub server_port: u16,

    /// Front-end origin allowed by CORS
    pub client_url: String,

    /// Directory for uploaded images, staged imports and reports
    pub upload_dir: PathBuf,

    /// Chromium binary used for quote PDFs
    pub chromium_path: String,

    /// Mark the auth cookie `Secure`
    pub cookie_secure: bool,

    /// Owner account seeded at startup (email, argon2 hash)
    pub admin_seed: Option<(String, String)>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set, generate one with: openssl rand -base64 48")?;
        validate_jwt_secret(&jwt_secret)?;

        let server_host = env_or("SERVER_HOST", "0.0.0.0");
        let server_port = match std::env::var("SERVER_PORT") {
            Ok(port) => port
                .parse()
                .with_context(|| format!("SERVER_PORT is not a valid port: {port}"))?,
            Err(_) => 3001,
        };

        let admin_seed = match (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD_HASH")) {
            (Ok(email), Ok(hash)) if !email.is_empty() && !hash.is_empty() => Some((email, hash)),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            server_host,
            server_port,
            client_url: env_or("CLIENT_URL", "http://localhost:5173"),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "./uploads")),
            chromium_path: env_or("CHROMIUM_PATH", "chromium"),
            cookie_secure: parse_flag(std::env::var("COOKIE_SECURE").ok().as_deref()),
            admin_seed,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn validate_jwt_secret(secret: &str) -> Result<()> {
    if secret.len() < 32 {
        anyhow::bail!(
            "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
            secret.len()
        );
    }

    const KNOWN_DEV_SECRETS: &[&str] = &[
        "dev-secret-change-in-production-min-32-bytes!!",
    ];
    if KNOWN_DEV_SECRETS.contains(&secret) {
        tracing::warn!("JWT_SECRET matches a known default, change it for production");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_jwt_secret_rejected() {
        assert!(validate_jwt_secret("too-short").is_err());
        assert!(validate_jwt_secret(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some(" 1 ")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(None));
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", "x".repeat(48));
        std::env::remove_var("SERVER_PORT");
        std::env::remove_var("UPLOAD_DIR");

        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 3001);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
    }
}
