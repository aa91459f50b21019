//! HTTP handlers and routing

pub mod auth;
pub mod company;
pub mod health;
pub mod import;
pub mod product;
pub mod quote;
pub mod stats;
pub mod supplier;
pub mod upload;
pub mod user;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::audit;
use crate::services::import_pipeline::ImportDeps;
use crate::services::import_queue::ImportQueue;
use crate::services::pdf::PdfRenderer;
use crate::services::storage::{UploadStorage, PUBLIC_PREFIX};
use crate::types::AuditEntry;

/// Request bodies up to 20 MiB (spreadsheets and images)
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub import: ImportDeps,
    pub queue: ImportQueue,
    pub pdf: Arc<dyn PdfRenderer>,
}

impl AppState {
    pub fn storage(&self) -> &UploadStorage {
        &self.import.storage
    }

    /// Append to the audit trail; failures are logged only
    pub async fn audit(&self, entry: AuditEntry) {
        audit::record(self.import.audit.as_ref(), entry).await;
    }
}

/// Build the HTTP router: JSON API under `/api`, uploads under `/uploads`
pub fn router(state: AppState) -> Result<Router> {
    let origin: HeaderValue = state
        .config
        .client_url
        .parse()
        .with_context(|| format!("CLIENT_URL is not a valid origin: {}", state.config.client_url))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let uploads = ServeDir::new(state.storage().root());

    let api = Router::new()
        .route("/health", get(health::handle_health))
        // Auth
        .route("/auth/login", post(auth::handle_login))
        .route("/auth/logout", post(auth::handle_logout))
        .route("/auth/me", get(auth::handle_me))
        .route("/auth/change-password", post(auth::handle_change_password))
        // Users
        .route("/users", get(user::handle_list).post(user::handle_create))
        .route(
            "/users/:id",
            get(user::handle_get).patch(user::handle_update).delete(user::handle_delete),
        )
        .route("/users/:id/reset-password", post(user::handle_reset_password))
        // Suppliers
        .route("/suppliers", get(supplier::handle_list).post(supplier::handle_create))
        .route(
            "/suppliers/:id",
            get(supplier::handle_get)
                .patch(supplier::handle_update)
                .delete(supplier::handle_delete),
        )
        // Products
        .route("/products", get(product::handle_list).post(product::handle_create))
        .route(
            "/products/:id",
            get(product::handle_get)
                .patch(product::handle_update)
                .delete(product::handle_delete),
        )
        .route("/products/:id/images", post(product::handle_upload_image))
        .route(
            "/products/images/:image_id",
            axum::routing::delete(product::handle_delete_image),
        )
        // Quotes
        .route("/quotes", get(quote::handle_list).post(quote::handle_create))
        .route(
            "/quotes/:id",
            get(quote::handle_get).patch(quote::handle_update).delete(quote::handle_delete),
        )
        .route("/quotes/:id/items", post(quote::handle_add_items))
        .route(
            "/quotes/items/:item_id",
            patch(quote::handle_update_item).delete(quote::handle_remove_item),
        )
        .route("/quotes/:id/mark-exported", patch(quote::handle_mark_exported))
        .route("/quotes/:id/export", get(quote::handle_export_pdf))
        // Import
        .route("/import/products", post(import::handle_import_sync))
        .route("/import/products/async", post(import::handle_import_async))
        .route("/import/products/preview", post(import::handle_preview))
        .route("/import/template/products", get(import::handle_csv_template))
        .route("/import/template/products.xlsx", get(import::handle_xlsx_template))
        .route("/import/jobs", get(import::handle_list_jobs))
        .route(
            "/import/jobs/:id",
            get(import::handle_job_status).delete(import::handle_delete_job),
        )
        .route("/import/jobs/:id/cancel", post(import::handle_cancel_job))
        .route("/import/jobs/:id/report", get(import::handle_download_report))
        // Company profile
        .route(
            "/company-profile",
            get(company::handle_get).put(company::handle_update),
        )
        .route("/company-profile/logo", post(company::handle_upload_logo))
        // Stats
        .route("/stats", get(stats::handle_stats));

    let app = Router::new()
        .nest("/api", api)
        .nest_service(PUBLIC_PREFIX, uploads)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
