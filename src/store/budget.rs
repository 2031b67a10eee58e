//! Budget Repository
//!
//! Stores per-project budget limits and the last computed usage snapshot.
//! The snapshot column is a derived cache only; reads that matter rebuild
//! it from the expense store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{CategoryLimit, ProjectBudget, ProjectBudgetSnapshot};

use super::StoreError;

/// Persistence contract for project budgets.
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn find(&self, project_id: &str) -> Result<Option<ProjectBudget>, StoreError>;

    /// Insert or replace the budget configuration for a project.
    async fn upsert(&self, budget: ProjectBudget) -> Result<ProjectBudget, StoreError>;

    /// Persist a freshly computed snapshot. Best-effort from the caller's
    /// perspective; the snapshot is re-derivable at any time.
    async fn save_snapshot(&self, snapshot: &ProjectBudgetSnapshot) -> Result<(), StoreError>;
}

/// Map-backed [`BudgetRepository`] for single-process/test use.
#[derive(Default, Clone)]
pub struct MemoryBudgetRepository {
    budgets: Arc<RwLock<HashMap<String, ProjectBudget>>>,
    snapshots: Arc<RwLock<HashMap<String, ProjectBudgetSnapshot>>>,
}

impl MemoryBudgetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last persisted snapshot for a project. Test observability hook.
    pub async fn saved_snapshot(&self, project_id: &str) -> Option<ProjectBudgetSnapshot> {
        self.snapshots.read().await.get(project_id).cloned()
    }
}

#[async_trait]
impl BudgetRepository for MemoryBudgetRepository {
    async fn find(&self, project_id: &str) -> Result<Option<ProjectBudget>, StoreError> {
        Ok(self.budgets.read().await.get(project_id).cloned())
    }

    async fn upsert(&self, budget: ProjectBudget) -> Result<ProjectBudget, StoreError> {
        self.budgets
            .write()
            .await
            .insert(budget.project_id.clone(), budget.clone());
        Ok(budget)
    }

    async fn save_snapshot(&self, snapshot: &ProjectBudgetSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.budget.project_id.clone(), snapshot.clone());
        Ok(())
    }
}

/// Postgres-backed [`BudgetRepository`].
#[derive(Clone)]
pub struct PgBudgetRepository {
    pool: PgPool,
}

impl PgBudgetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetRepository for PgBudgetRepository {
    async fn find(&self, project_id: &str) -> Result<Option<ProjectBudget>, StoreError> {
        let row: Option<(
            String,
            String,
            Option<String>,
            Option<f64>,
            serde_json::Value,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT project_id, currency, total, warn_threshold, categories, updated_at
            FROM project_budgets
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(project_id, currency, total, warn_threshold, categories, updated_at)| {
                let categories: Vec<CategoryLimit> = serde_json::from_value(categories)?;
                Ok(ProjectBudget {
                    project_id,
                    currency,
                    total,
                    warn_threshold,
                    categories,
                    updated_at,
                })
            },
        )
        .transpose()
    }

    async fn upsert(&self, budget: ProjectBudget) -> Result<ProjectBudget, StoreError> {
        let categories = serde_json::to_value(&budget.categories)?;
        sqlx::query(
            r#"
            INSERT INTO project_budgets (project_id, currency, total, warn_threshold, categories, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (project_id) DO UPDATE SET
                currency = EXCLUDED.currency,
                total = EXCLUDED.total,
                warn_threshold = EXCLUDED.warn_threshold,
                categories = EXCLUDED.categories,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&budget.project_id)
        .bind(&budget.currency)
        .bind(&budget.total)
        .bind(budget.warn_threshold)
        .bind(categories)
        .bind(budget.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(budget)
    }

    async fn save_snapshot(&self, snapshot: &ProjectBudgetSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_value(snapshot)?;
        sqlx::query("UPDATE project_budgets SET snapshot = $2 WHERE project_id = $1")
            .bind(&snapshot.budget.project_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_budget(project_id: &str) -> ProjectBudget {
        ProjectBudget {
            project_id: project_id.into(),
            currency: "USD".into(),
            total: Some("100.00".into()),
            warn_threshold: Some(0.8),
            categories: vec![CategoryLimit {
                name: "travel".into(),
                limit: "50.00".into(),
            }],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_find_missing() {
        let repo = MemoryBudgetRepository::new();
        assert!(repo.find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces() {
        let repo = MemoryBudgetRepository::new();
        repo.upsert(sample_budget("p-1")).await.unwrap();

        let mut updated = sample_budget("p-1");
        updated.total = Some("200.00".into());
        repo.upsert(updated).await.unwrap();

        let found = repo.find("p-1").await.unwrap().unwrap();
        assert_eq!(found.total.as_deref(), Some("200.00"));
    }

    #[tokio::test]
    async fn test_memory_snapshot_round_trip() {
        let repo = MemoryBudgetRepository::new();
        let snapshot = ProjectBudgetSnapshot {
            budget: sample_budget("p-1"),
            spent_total: "30.00".into(),
            remaining_total: Some("70.00".into()),
            categories_usage: vec![],
        };
        repo.save_snapshot(&snapshot).await.unwrap();
        assert_eq!(repo.saved_snapshot("p-1").await, Some(snapshot));
    }
}
