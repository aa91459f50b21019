//! Audit trail types

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Import,
    Export,
    AddItems,
    UpdateItem,
    RemoveItem,
    Login,
    Logout,
    ChangePassword,
    ResetPassword,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Import => "IMPORT",
            AuditAction::Export => "EXPORT",
            AuditAction::AddItems => "ADD_ITEMS",
            AuditAction::UpdateItem => "UPDATE_ITEM",
            AuditAction::RemoveItem => "REMOVE_ITEM",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::ChangePassword => "CHANGE_PASSWORD",
            AuditAction::ResetPassword => "RESET_PASSWORD",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audited entity kinds
pub mod entity {
    pub const SUPPLIER: &str = "Supplier";
    pub const PRODUCT: &str = "Product";
    pub const PRODUCT_IMAGE: &str = "ProductImage";
    pub const QUOTE: &str = "Quote";
    pub const USER: &str = "User";
    pub const COMPANY_PROFILE: &str = "CompanyProfile";
    pub const IMPORT_JOB: &str = "ImportJob";
}

/// Entry to append to the audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity: &'static str,
    pub entity_id: Option<String>,
    pub summary: Option<String>,
}

impl AuditEntry {
    pub fn new(user_id: Option<Uuid>, action: AuditAction, entity: &'static str) -> Self {
        Self {
            user_id,
            action,
            entity,
            entity_id: None,
            summary: None,
        }
    }

    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_builder() {
        let user = Uuid::new_v4();
        let entry = AuditEntry::new(Some(user), AuditAction::AddItems, entity::QUOTE)
            .entity_id("q-1")
            .summary("添加 2 个明细");
        assert_eq!(entry.action.as_str(), "ADD_ITEMS");
        assert_eq!(entry.entity_id.as_deref(), Some("q-1"));
        assert_eq!(entry.user_id, Some(user));
    }
}
