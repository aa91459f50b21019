//! Supplier types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::product::Product;

/// Supplier category, stored and exchanged by its display label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar")]
pub enum SupplierCategory {
    #[sqlx(rename = "软件系统")]
    #[serde(rename = "软件系统")]
    Software,
    #[sqlx(rename = "硬件设备")]
    #[serde(rename = "硬件设备")]
    Hardware,
    #[sqlx(rename = "仓储设备")]
    #[serde(rename = "仓储设备")]
    Warehousing,
    #[sqlx(rename = "干杂粮油")]
    #[serde(rename = "干杂粮油")]
    DryGoods,
    #[sqlx(rename = "海鲜冻品")]
    #[serde(rename = "海鲜冻品")]
    FrozenSeafood,
    #[sqlx(rename = "预包装食品")]
    #[serde(rename = "预包装食品")]
    PackagedFood,
    #[sqlx(rename = "用品用具")]
    #[serde(rename = "用品用具")]
    Supplies,
    #[sqlx(rename = "洗涤消毒")]
    #[serde(rename = "洗涤消毒")]
    Cleaning,
    #[sqlx(rename = "服装箱包")]
    #[serde(rename = "服装箱包")]
    Apparel,
    #[sqlx(rename = "车辆设备")]
    #[serde(rename = "车辆设备")]
    Vehicles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, Default)]
#[sqlx(type_name = "supplier_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SupplierStatus {
    #[default]
    Enabled,
    Disabled,
}

/// Supplier entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,

    // Bank details
    pub bank_name: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,

    pub category: Option<SupplierCategory>,
    pub note: Option<String>,
    pub status: SupplierStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supplier with its most recent products
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierDetail {
    #[serde(flatten)]
    pub supplier: Supplier,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplierRequest {
    pub name: String,
    pub contact: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub category: Option<SupplierCategory>,
    pub note: Option<String>,
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSupplierRequest {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub category: Option<SupplierCategory>,
    pub note: Option<String>,
    pub status: Option<SupplierStatus>,
}

/// Query string of `GET /suppliers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Matches name, contact or phone
    pub search: Option<String>,
    pub name: Option<String>,
    pub category: Option<SupplierCategory>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_uses_label_on_the_wire() {
        let json = serde_json::to_string(&SupplierCategory::FrozenSeafood).unwrap();
        assert_eq!(json, "\"海鲜冻品\"");
        let parsed: SupplierCategory = serde_json::from_str("\"车辆设备\"").unwrap();
        assert_eq!(parsed, SupplierCategory::Vehicles);
    }

    #[test]
    fn test_category_labels_are_distinct() {
        let all = [
            SupplierCategory::Software,
            SupplierCategory::Hardware,
            SupplierCategory::Warehousing,
            SupplierCategory::DryGoods,
            SupplierCategory::FrozenSeafood,
            SupplierCategory::PackagedFood,
            SupplierCategory::Supplies,
            SupplierCategory::Cleaning,
            SupplierCategory::Apparel,
            SupplierCategory::Vehicles,
        ];
        let mut labels: Vec<_> = all.iter().map(|c| serde_json::to_string(c).unwrap()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 10);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let parsed: Result<SupplierCategory, _> = serde_json::from_str("\"家具\"");
        assert!(parsed.is_err());
    }
}
