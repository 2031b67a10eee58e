//! Audit Log Sink
//!
//! Records who did what to which entity, with optional before/after
//! snapshots. Fire-and-forget from the ledger's perspective: a failed
//! audit write is logged and never fails the business operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;

/// Audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    /// Free-form action details, e.g. the overrun amount for automation.
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ExpenseCreated,
    ExpenseUpdated,
    ExpenseStatusChanged,
    ProjectBudgetUpdated,
    AutomationTriggered,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ExpenseCreated => "expense.created",
            AuditAction::ExpenseUpdated => "expense.updated",
            AuditAction::ExpenseStatusChanged => "expense.status_changed",
            AuditAction::ProjectBudgetUpdated => "project_budget.updated",
            AuditAction::AutomationTriggered => "automation.triggered",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for audit entries.
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    action: AuditAction,
    actor_id: String,
    entity_type: String,
    entity_id: String,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    details: Option<serde_json::Value>,
}

impl AuditEntryBuilder {
    pub fn new(action: AuditAction, actor_id: impl Into<String>) -> Self {
        Self {
            action,
            actor_id: actor_id.into(),
            entity_type: String::new(),
            entity_id: String::new(),
            before_state: None,
            after_state: None,
            details: None,
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: impl ToString) -> Self {
        self.entity_type = entity_type.to_string();
        self.entity_id = entity_id.to_string();
        self
    }

    pub fn before_state<T: Serialize>(mut self, state: &T) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            action: self.action.as_str().to_string(),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            before_state: self.before_state,
            after_state: self.after_state,
            details: self.details,
            created_at: Utc::now(),
        }
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;
}

/// Postgres-backed [`AuditSink`].
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_id, action, entity_type, entity_id,
                before_state, after_state, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.before_state)
        .bind(&entry.after_state)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            audit_id = %entry.id,
            action = %entry.action,
            "Audit log entry created"
        );
        Ok(())
    }
}

/// In-memory [`AuditSink`] for single-process use and test assertions.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Entries recorded for a specific action, newest last.
    pub async fn entries_for(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.action == action.as_str())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::ExpenseCreated.as_str(), "expense.created");
        assert_eq!(
            AuditAction::ExpenseStatusChanged.as_str(),
            "expense.status_changed"
        );
        assert_eq!(
            AuditAction::AutomationTriggered.as_str(),
            "automation.triggered"
        );
    }

    #[test]
    fn test_audit_entry_builder() {
        let entry = AuditEntryBuilder::new(AuditAction::ExpenseCreated, "user-1")
            .entity("expense", "abc-123")
            .details(serde_json::json!({ "exceeded_by": "10.00" }))
            .build();

        assert_eq!(entry.action, "expense.created");
        assert_eq!(entry.actor_id, "user-1");
        assert_eq!(entry.entity_type, "expense");
        assert_eq!(entry.entity_id, "abc-123");
        assert_eq!(
            entry.details.unwrap()["exceeded_by"],
            serde_json::json!("10.00")
        );
    }

    #[tokio::test]
    async fn test_memory_sink_records_and_filters() {
        let sink = MemoryAuditSink::new();
        sink.record(
            AuditEntryBuilder::new(AuditAction::ExpenseCreated, "u1")
                .entity("expense", "e1")
                .build(),
        )
        .await
        .unwrap();
        sink.record(
            AuditEntryBuilder::new(AuditAction::AutomationTriggered, "system")
                .entity("expense", "e1")
                .build(),
        )
        .await
        .unwrap();

        assert_eq!(sink.entries().await.len(), 2);
        let automation = sink.entries_for(AuditAction::AutomationTriggered).await;
        assert_eq!(automation.len(), 1);
        assert_eq!(automation[0].actor_id, "system");
    }
}
