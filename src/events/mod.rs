//! Domain Event Sink
//!
//! Business and telemetry events emitted by the Finance Service, e.g.
//! `expense.created` or `automation.triggered`. Same fire-and-forget
//! contract as the audit sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;

/// Event type names.
pub mod event_types {
    pub const EXPENSE_CREATED: &str = "expense.created";
    pub const EXPENSE_STATUS_CHANGED: &str = "expense.status_changed";
    pub const PROJECT_BUDGET_UPDATED: &str = "project_budget.updated";
    pub const PROJECT_BUDGET_EXCEEDED: &str = "project_budget.exceeded";
    pub const AUTOMATION_TRIGGERED: &str = "automation.triggered";
}

/// One emitted domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Destination for domain events.
#[async_trait]
pub trait DomainEventSink: Send + Sync {
    async fn emit(
        &self,
        event_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed [`DomainEventSink`].
#[derive(Clone)]
pub struct PgDomainEventSink {
    pool: PgPool,
}

impl PgDomainEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainEventSink for PgDomainEventSink {
    async fn emit(
        &self,
        event_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO domain_events (id, event_type, entity_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(event_type)
        .bind(entity_id)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!(event_id = %id, event_type, entity_id, "Domain event emitted");
        Ok(())
    }
}

/// In-memory [`DomainEventSink`] for single-process use and test
/// assertions.
#[derive(Default, Clone)]
pub struct MemoryDomainEventSink {
    events: Arc<RwLock<Vec<DomainEvent>>>,
}

impl MemoryDomainEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DomainEventSink for MemoryDomainEventSink {
    async fn emit(
        &self,
        event_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.events.write().await.push(DomainEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
