//! Quote types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Quote lifecycle. DRAFT moves to EXPORTED and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "quote_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteStatus {
    Draft,
    Exported,
}

/// Quote entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: Uuid,
    pub code: String,
    pub creator_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub currency: String,
    pub tax_rate: Decimal,
    pub status: QuoteStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quote line. `display_price` is always derived from the other price columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItem {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub base_price: Decimal,
    pub row_delta: Decimal,
    pub row_amount: Decimal,
    pub display_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Quote line joined with the product columns shown on screen and in the PDF
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItemView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: QuoteItem,
    pub product_name: String,
    pub product_spec: String,
    pub product_description: Option<String>,
    pub lead_days: i32,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Quote with its ordered lines and computed totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDetail {
    #[serde(flatten)]
    pub quote: Quote,
    pub items: Vec<QuoteItemView>,
    pub totals: QuoteTotals,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequest {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub currency: Option<String>,
    pub tax_rate: Option<Decimal>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteRequest {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub currency: Option<String>,
    pub tax_rate: Option<Decimal>,
    pub note: Option<String>,
}

/// One element of the `POST /quotes/:id/items` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddQuoteItem {
    pub product_id: Uuid,
    #[serde(default = "default_item_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub row_delta: Decimal,
    #[serde(default)]
    pub row_amount: Decimal,
}

fn default_item_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteItemRequest {
    pub quantity: Option<i32>,
    pub row_delta: Option<Decimal>,
    pub row_amount: Option<Decimal>,
}

/// Query string of `GET /quotes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub only_mine: Option<bool>,
    pub status: Option<QuoteStatus>,
    pub customer_name: Option<String>,
}
