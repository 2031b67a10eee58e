//! In-process Expense Store
//!
//! A thread-safe map-backed implementation. Fast and volatile; intended
//! for single-process deployments, development, and tests. The idempotency
//! map lives under the same lock as the expense map, so lookup, create and
//! record happen atomically and the duplicate-key race of the persistent
//! backend cannot occur here.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::money::amount_to_cents;
use crate::domain::{Expense, ExpensePatch, ExpenseStatus, NewAttachment, NewExpense};

use super::{
    matches_aggregate, matches_filter, materialize_attachments, AggregateFilter, ExpenseFilter,
    ExpenseStore, IdempotentCreate, StoreError,
};

#[derive(Default)]
struct Inner {
    expenses: HashMap<Uuid, Expense>,
    /// Caller-supplied idempotency key -> first-created expense id.
    idempotency: HashMap<String, Uuid>,
}

/// Map-backed [`ExpenseStore`].
#[derive(Default, Clone)]
pub struct MemoryExpenseStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryExpenseStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an expense outright, leaving any idempotency mapping
    /// pointing at it behind. Test hook for exercising stale-mapping
    /// supersession.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.inner.write().await.expenses.remove(&id).is_some()
    }

    fn build_expense(
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Expense {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Expense {
            id,
            workspace_id: new.workspace_id,
            project_id: new.project_id,
            task_id: new.task_id,
            date: new.date,
            amount: new.amount,
            currency: new.currency,
            category: new.category,
            description: new.description,
            vendor: new.vendor,
            payment_method: new.payment_method,
            tax_amount: new.tax_amount,
            status: new.status,
            attachments: materialize_attachments(id, attachments, now),
            created_by: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl ExpenseStore for MemoryExpenseStore {
    async fn create(
        &self,
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Result<Expense, StoreError> {
        let expense = Self::build_expense(new, attachments, actor_id);
        let mut inner = self.inner.write().await;
        inner.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.expenses.get(&id).cloned())
    }

    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError> {
        let inner = self.inner.read().await;
        let mut result: Vec<Expense> = inner
            .expenses
            .values()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(result)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: ExpensePatch,
        attachments: Vec<NewAttachment>,
    ) -> Result<Option<Expense>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(expense) = inner.expenses.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        patch.apply_to(expense);
        expense
            .attachments
            .extend(materialize_attachments(id, attachments, now));
        expense.updated_at = now;
        Ok(Some(expense.clone()))
    }

    async fn change_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        _actor_id: &str,
    ) -> Result<Option<Expense>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(expense) = inner.expenses.get_mut(&id) else {
            return Ok(None);
        };
        if expense.status != status {
            expense.status = status;
            expense.updated_at = Utc::now();
        }
        Ok(Some(expense.clone()))
    }

    async fn aggregate_by_category(
        &self,
        filter: &AggregateFilter,
    ) -> Result<BTreeMap<String, i64>, StoreError> {
        let inner = self.inner.read().await;
        let mut totals = BTreeMap::new();
        for expense in inner.expenses.values() {
            if !matches_aggregate(expense, filter) {
                continue;
            }
            let cents = amount_to_cents(&expense.amount)
                .map_err(|_| StoreError::Corrupt(expense.amount.clone()))?;
            *totals.entry(expense.category.to_lowercase()).or_insert(0) += cents;
        }
        Ok(totals)
    }

    async fn create_idempotent(
        &self,
        key: Option<&str>,
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Result<IdempotentCreate, StoreError> {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            let expense = self.create(new, attachments, actor_id).await?;
            return Ok(IdempotentCreate::Created(expense));
        };

        let mut inner = self.inner.write().await;
        if let Some(existing_id) = inner.idempotency.get(key) {
            if let Some(existing) = inner.expenses.get(existing_id) {
                return Ok(IdempotentCreate::Replayed(existing.clone()));
            }
            // Mapping points at a vanished expense: supersede it below.
        }

        let expense = Self::build_expense(new, attachments, actor_id);
        inner.expenses.insert(expense.id, expense.clone());
        inner.idempotency.insert(key.to_string(), expense.id);
        Ok(IdempotentCreate::Created(expense))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExpenseStatus;

    fn sample_new(project: &str, amount: &str, category: &str) -> NewExpense {
        NewExpense {
            workspace_id: "ws-1".into(),
            project_id: project.into(),
            task_id: None,
            date: Utc::now(),
            amount: amount.into(),
            currency: "USD".into(),
            category: category.into(),
            description: None,
            vendor: None,
            payment_method: None,
            tax_amount: None,
            status: ExpenseStatus::Draft,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamps() {
        let store = MemoryExpenseStore::new();
        let expense = store
            .create(sample_new("p-1", "10.00", "travel"), vec![], "user-1")
            .await
            .unwrap();
        assert_eq!(expense.created_by, "user-1");
        assert_eq!(expense.created_at, expense.updated_at);

        let fetched = store.get_by_id(expense.id).await.unwrap().unwrap();
        assert_eq!(fetched, expense);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let store = MemoryExpenseStore::new();
        let result = store
            .update(Uuid::new_v4(), ExpensePatch::default(), vec![])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_same_status_change_is_noop() {
        let store = MemoryExpenseStore::new();
        let expense = store
            .create(sample_new("p-1", "10.00", "travel"), vec![], "user-1")
            .await
            .unwrap();
        let unchanged = store
            .change_status(expense.id, ExpenseStatus::Draft, "user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.updated_at, expense.updated_at);
    }

    #[tokio::test]
    async fn test_idempotent_create_dedupes_by_key() {
        let store = MemoryExpenseStore::new();
        let first = store
            .create_idempotent(
                Some("req-1"),
                sample_new("p-1", "50.00", "travel"),
                vec![],
                "user-1",
            )
            .await
            .unwrap();
        assert!(!first.is_replay());
        let first = first.into_expense();

        let second = store
            .create_idempotent(
                Some("req-1"),
                sample_new("p-1", "999.00", "meals"),
                vec![],
                "user-1",
            )
            .await
            .unwrap();
        assert!(second.is_replay());
        let second = second.into_expense();

        assert_eq!(first.id, second.id);
        assert_eq!(second.amount, "50.00");
        let all = store.list(&ExpenseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_key_does_not_dedupe() {
        let store = MemoryExpenseStore::new();
        for key in [Some(""), None] {
            let outcome = store
                .create_idempotent(key, sample_new("p-1", "1.00", "a"), vec![], "u")
                .await
                .unwrap();
            assert!(!outcome.is_replay());
        }
        let all = store.list(&ExpenseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_mapping_superseded_after_expense_removed() {
        let store = MemoryExpenseStore::new();
        let first = store
            .create_idempotent(
                Some("req-1"),
                sample_new("p-1", "50.00", "travel"),
                vec![],
                "user-1",
            )
            .await
            .unwrap()
            .into_expense();

        assert!(store.remove(first.id).await);

        let second = store
            .create_idempotent(
                Some("req-1"),
                sample_new("p-1", "60.00", "travel"),
                vec![],
                "user-1",
            )
            .await
            .unwrap();
        assert!(!second.is_replay());
        let second = second.into_expense();
        assert_ne!(second.id, first.id);

        // The mapping now points at the replacement.
        let replay = store
            .create_idempotent(
                Some("req-1"),
                sample_new("p-1", "70.00", "travel"),
                vec![],
                "user-1",
            )
            .await
            .unwrap();
        assert!(replay.is_replay());
        assert_eq!(replay.into_expense().id, second.id);
    }
}
