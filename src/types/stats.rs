//! Dashboard statistics

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub suppliers: i64,
    pub products: i64,
    pub quotes: i64,
    /// Sum of catalog prices, 2 decimal places
    pub total_value: Decimal,
}
