//! Append-only audit trail

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::types::AuditEntry;

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
}

/// Append an entry. A failing audit write is logged and never fails the
/// action being audited.
pub async fn record(trail: &dyn AuditTrail, entry: AuditEntry) {
    let action = entry.action;
    let entity = entry.entity;
    if let Err(e) = trail.append(entry).await {
        warn!(%action, entity, "Failed to write audit log: {:#}", e);
    }
}
