//! Product catalog types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::supplier::Supplier;

/// Cover image given to products created without one
pub const DEFAULT_PRODUCT_IMAGE_URL: &str = "https://placehold.co/400x300?text=Product";

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub spec: String,
    pub price: Decimal,
    pub lead_days: i32,
    pub quantity: i32,
    pub description: Option<String>,
    pub note: Option<String>,
    pub barcode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product row for list views
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub supplier_name: String,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub sort: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub id: Uuid,
    pub product_id: Uuid,
    pub old_price: Decimal,
    pub new_price: Decimal,
    /// User id, or `system` for unattended imports
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Product with supplier, images and recent price changes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub supplier: Supplier,
    pub images: Vec<ProductImage>,
    pub price_history: Vec<PriceHistory>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub supplier_id: Uuid,
    pub name: String,
    pub spec: String,
    pub price: Decimal,
    pub lead_days: Option<i32>,
    pub quantity: Option<i32>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub spec: Option<String>,
    pub price: Option<Decimal>,
    pub lead_days: Option<i32>,
    pub quantity: Option<i32>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub barcode: Option<String>,
}

/// Query string of `GET /products`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Matches name, spec or barcode
    pub search: Option<String>,
    pub supplier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageUploadQuery {
    pub sort: Option<i32>,
}
