//! Expense Store
//!
//! Storage-agnostic contract for the expense collection, with two
//! conforming implementations: an in-process map for single-process/test
//! use and a Postgres-backed one for production. Both must behave
//! identically; the shared conformance suite in `tests/` runs against each.

pub mod budget;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Expense, ExpensePatch, ExpenseStatus, NewAttachment, NewExpense};

pub use budget::{BudgetRepository, MemoryBudgetRepository, PgBudgetRepository};
pub use memory::MemoryExpenseStore;
pub use postgres::PgExpenseStore;

/// Storage-layer errors. Validation never happens here; these are
/// infrastructure failures only.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored field failed to parse back into its domain type. Inputs
    /// are normalized before they reach the store, so this indicates
    /// corrupt storage, not bad input.
    #[error("Corrupt stored record: {0}")]
    Corrupt(String),
}

/// Materialize attachment payloads into owned attachment records.
pub(crate) fn materialize_attachments(
    expense_id: Uuid,
    attachments: Vec<NewAttachment>,
    uploaded_at: DateTime<Utc>,
) -> Vec<crate::domain::ExpenseAttachment> {
    attachments
        .into_iter()
        .map(|a| crate::domain::ExpenseAttachment {
            id: Uuid::new_v4(),
            expense_id,
            filename: a.filename,
            url: a.url,
            uploaded_at,
        })
        .collect()
}

/// Result of [`ExpenseStore::create_idempotent`]: the expense plus whether
/// this call was the one that created it. Replays must not re-fire
/// creation side effects, so the distinction is part of the contract.
#[derive(Debug, Clone)]
pub enum IdempotentCreate {
    /// A new expense was created by this call.
    Created(Expense),
    /// The key was already mapped; the original expense is returned.
    Replayed(Expense),
}

impl IdempotentCreate {
    pub fn is_replay(&self) -> bool {
        matches!(self, IdempotentCreate::Replayed(_))
    }

    pub fn into_expense(self) -> Expense {
        match self {
            IdempotentCreate::Created(expense) | IdempotentCreate::Replayed(expense) => expense,
        }
    }
}

/// Filters for listing expenses. All fields are optional and combined
/// with AND.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub workspace_id: Option<String>,
    pub project_id: Option<String>,
    pub status: Option<ExpenseStatus>,
    /// Case-insensitive category match.
    pub category: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring search over vendor and description.
    pub search: Option<String>,
}

/// Filters for category aggregation.
#[derive(Debug, Clone)]
pub struct AggregateFilter {
    pub project_id: String,
    pub workspace_id: Option<String>,
    /// Restrict to these statuses; `None` aggregates everything.
    pub statuses: Option<Vec<ExpenseStatus>>,
}

impl AggregateFilter {
    /// Aggregate final-status spend for one project, the shape the budget
    /// snapshot builder uses.
    pub fn final_spend(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            workspace_id: None,
            statuses: Some(crate::domain::FINAL_STATUSES.to_vec()),
        }
    }
}

/// The storage contract for expenses.
///
/// `create_idempotent` carries the exactly-once guarantee: for a given
/// non-empty key at most one expense is ever created, regardless of
/// retries or concurrent duplicates.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Persist a new expense with its attachments. The store assigns the
    /// id and timestamps; `actor_id` becomes `created_by`.
    async fn create(
        &self,
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Result<Expense, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Expense>, StoreError>;

    /// List expenses matching the filter, ordered by date descending then
    /// creation time descending.
    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError>;

    /// Apply a field patch and append attachments. Returns `None` when the
    /// expense does not exist. Status is not part of the patch; use
    /// [`ExpenseStore::change_status`].
    async fn update(
        &self,
        id: Uuid,
        patch: ExpensePatch,
        attachments: Vec<NewAttachment>,
    ) -> Result<Option<Expense>, StoreError>;

    /// Set the status. A same-status call is a no-op returning the current
    /// record. Returns `None` when the expense does not exist. Transition
    /// legality is the Finance Service's concern, not the store's.
    async fn change_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        actor_id: &str,
    ) -> Result<Option<Expense>, StoreError>;

    /// Sum expense amounts in cents, grouped by lowercased category.
    async fn aggregate_by_category(
        &self,
        filter: &AggregateFilter,
    ) -> Result<BTreeMap<String, i64>, StoreError>;

    /// Create with exactly-once semantics for the given key.
    ///
    /// An empty or absent key disables deduplication. Otherwise: if a
    /// mapping for `key` exists and its expense is still present, that
    /// expense is returned as a replay and nothing is created; a mapping
    /// whose expense has disappeared is superseded by re-executing the
    /// create.
    async fn create_idempotent(
        &self,
        key: Option<&str>,
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Result<IdempotentCreate, StoreError>;
}

/// Filter predicate shared by the in-memory store (the Postgres store
/// expresses the same conditions in SQL; the conformance suite keeps the
/// two honest).
pub(crate) fn matches_filter(expense: &Expense, filter: &ExpenseFilter) -> bool {
    if let Some(workspace_id) = &filter.workspace_id {
        if &expense.workspace_id != workspace_id {
            return false;
        }
    }
    if let Some(project_id) = &filter.project_id {
        if &expense.project_id != project_id {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if expense.status != status {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if !expense.category.eq_ignore_ascii_case(category) {
            return false;
        }
    }
    if let Some(from) = filter.date_from {
        if expense.date < from {
            return false;
        }
    }
    if let Some(to) = filter.date_to {
        if expense.date > to {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let haystack = format!(
            "{} {}",
            expense.vendor.as_deref().unwrap_or(""),
            expense.description.as_deref().unwrap_or("")
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    true
}

/// Status-set predicate for aggregation.
pub(crate) fn matches_aggregate(expense: &Expense, filter: &AggregateFilter) -> bool {
    if expense.project_id != filter.project_id {
        return false;
    }
    if let Some(workspace_id) = &filter.workspace_id {
        if &expense.workspace_id != workspace_id {
            return false;
        }
    }
    if let Some(statuses) = &filter.statuses {
        if !statuses.contains(&expense.status) {
            return false;
        }
    }
    true
}
