//! Supplydesk server - back office API for supplier catalogs, product imports
//! and customer quotes.

mod admin;
mod auth;
mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::handlers::AppState;
use crate::services::import_pipeline::ImportDeps;
use crate::services::import_queue::ImportQueue;
use crate::services::pdf::ChromiumPdfRenderer;
use crate::services::pg_store::PgStore;
use crate::services::storage::UploadStorage;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - LOGS_DIR or ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // Daily rotated file next to stdout
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,supplydesk_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = serve(config).await {
                error!("Server error: {:#}", e);
                return Err(e);
            }
        }
        Command::Migrate => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;
        }
        Command::CreateAdmin { email } => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;
            admin::create_admin_interactive(&pool, &email).await?;
        }
        Command::ResetAdmin { email } => {
            let pool = db::create_pool(&config.database_url).await?;
            admin::reset_admin_interactive(&pool, &email).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Supplydesk server...");

    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;
    admin::ensure_admin_from_env(&pool, config.admin_seed.as_ref()).await;

    let storage = UploadStorage::new(config.upload_dir.clone());
    storage.ensure_root().await?;
    info!(dir = %config.upload_dir.display(), "Upload directory ready");

    let store = Arc::new(PgStore::new(pool.clone()));
    let deps = ImportDeps {
        catalog: store.clone(),
        jobs: store.clone(),
        audit: store,
        storage,
    };
    let queue = ImportQueue::new(deps.clone());

    let address = config.bind_address();
    let state = AppState {
        pool,
        pdf: Arc::new(ChromiumPdfRenderer::new(config.chromium_path.clone())),
        config: Arc::new(config),
        import: deps,
        queue,
    };
    let app = handlers::router(state)?;

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}
