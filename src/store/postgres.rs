//! Persistent Expense Store
//!
//! Postgres-backed implementation of [`ExpenseStore`]. Delegates to the
//! `expenses` / `expense_attachments` CRUD tables plus the uniquely-keyed
//! `expense_idempotency_keys` table, with a time-boxed cache in front of
//! category aggregation (the most repeated expensive read).
//!
//! The idempotency mapping rows are the one concurrency-critical resource:
//! a duplicate-key write race between concurrent retries is resolved by
//! re-reading the winner's mapping and returning its expense, so retried
//! client requests always produce exactly one expense.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::money::amount_to_cents;
use crate::domain::{
    Expense, ExpenseAttachment, ExpensePatch, ExpenseStatus, NewAttachment, NewExpense,
};

use super::{AggregateFilter, ExpenseFilter, ExpenseStore, IdempotentCreate, StoreError};

/// One expense row, column order matching `SELECT_COLUMNS`.
type ExpenseRow = (
    Uuid,                 // id
    String,               // workspace_id
    String,               // project_id
    Option<String>,       // task_id
    DateTime<Utc>,        // expense_date
    String,               // amount
    String,               // currency
    String,               // category
    Option<String>,       // description
    Option<String>,       // vendor
    Option<String>,       // payment_method
    Option<String>,       // tax_amount
    String,               // status
    String,               // created_by
    DateTime<Utc>,        // created_at
    DateTime<Utc>,        // updated_at
);

const SELECT_COLUMNS: &str = "id, workspace_id, project_id, task_id, expense_date, amount, \
     currency, category, description, vendor, payment_method, tax_amount, status, created_by, \
     created_at, updated_at";

/// Time-boxed cache over `aggregate_by_category`, invalidated on every
/// write. A zero TTL disables caching entirely.
#[derive(Clone)]
struct AggregateCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, (Instant, BTreeMap<String, i64>)>>>,
}

impl AggregateCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cache_key(filter: &AggregateFilter) -> String {
        let statuses = filter
            .statuses
            .as_ref()
            .map(|s| {
                s.iter()
                    .map(|st| st.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_else(|| "*".to_string());
        format!(
            "{}|{}|{}",
            filter.project_id,
            filter.workspace_id.as_deref().unwrap_or(""),
            statuses
        )
    }

    async fn get(&self, filter: &AggregateFilter) -> Option<BTreeMap<String, i64>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        let (stored_at, totals) = entries.get(&Self::cache_key(filter))?;
        if stored_at.elapsed() < self.ttl {
            Some(totals.clone())
        } else {
            None
        }
    }

    async fn put(&self, filter: &AggregateFilter, totals: BTreeMap<String, i64>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(Self::cache_key(filter), (Instant::now(), totals));
    }

    async fn invalidate(&self) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.write().await.clear();
    }
}

/// Postgres-backed [`ExpenseStore`].
#[derive(Clone)]
pub struct PgExpenseStore {
    pool: PgPool,
    cache: AggregateCache,
}

impl PgExpenseStore {
    /// Create a store with aggregation caching disabled.
    pub fn new(pool: PgPool) -> Self {
        Self::with_cache_ttl(pool, Duration::ZERO)
    }

    /// Create a store that caches category aggregation for `ttl`.
    pub fn with_cache_ttl(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            cache: AggregateCache::new(ttl),
        }
    }

    fn row_to_expense(
        row: ExpenseRow,
        attachments: Vec<ExpenseAttachment>,
    ) -> Result<Expense, StoreError> {
        let (
            id,
            workspace_id,
            project_id,
            task_id,
            date,
            amount,
            currency,
            category,
            description,
            vendor,
            payment_method,
            tax_amount,
            status,
            created_by,
            created_at,
            updated_at,
        ) = row;

        let status: ExpenseStatus = status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("status '{}' on expense {}", status, id)))?;

        Ok(Expense {
            id,
            workspace_id,
            project_id,
            task_id,
            date,
            amount,
            currency,
            category,
            description,
            vendor,
            payment_method,
            tax_amount,
            status,
            attachments,
            created_by,
            created_at,
            updated_at,
        })
    }

    async fn fetch_attachments(
        &self,
        expense_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ExpenseAttachment>>, StoreError> {
        if expense_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, Uuid, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, expense_id, filename, url, uploaded_at
            FROM expense_attachments
            WHERE expense_id = ANY($1)
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .bind(expense_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_expense: HashMap<Uuid, Vec<ExpenseAttachment>> = HashMap::new();
        for (id, expense_id, filename, url, uploaded_at) in rows {
            by_expense.entry(expense_id).or_default().push(ExpenseAttachment {
                id,
                expense_id,
                filename,
                url,
                uploaded_at,
            });
        }
        Ok(by_expense)
    }

    async fn fetch_expense(&self, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let row: Option<ExpenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM expenses WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut attachments = self.fetch_attachments(&[id]).await?;
                let attachments = attachments.remove(&id).unwrap_or_default();
                Ok(Some(Self::row_to_expense(row, attachments)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_attachments(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        attachments: &[ExpenseAttachment],
    ) -> Result<(), StoreError> {
        for attachment in attachments {
            sqlx::query(
                r#"
                INSERT INTO expense_attachments (id, expense_id, filename, url, uploaded_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(attachment.id)
            .bind(attachment.expense_id)
            .bind(&attachment.filename)
            .bind(&attachment.url)
            .bind(attachment.uploaded_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn write_expense_row(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        expense: &Expense,
    ) -> Result<(), StoreError> {
        let amount_cents = amount_to_cents(&expense.amount)
            .map_err(|_| StoreError::Corrupt(expense.amount.clone()))?;

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, workspace_id, project_id, task_id, expense_date,
                amount, amount_cents, currency, category,
                description, vendor, payment_method, tax_amount,
                status, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(expense.id)
        .bind(&expense.workspace_id)
        .bind(&expense.project_id)
        .bind(&expense.task_id)
        .bind(expense.date)
        .bind(&expense.amount)
        .bind(amount_cents)
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(&expense.vendor)
        .bind(&expense.payment_method)
        .bind(&expense.tax_amount)
        .bind(expense.status.as_str())
        .bind(&expense.created_by)
        .bind(expense.created_at)
        .bind(expense.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn create(
        &self,
        new: NewExpense,
        attachments: Vec<NewAttachment>,
        actor_id: &str,
    ) -> Result<Expense, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let expense = Expense {
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
            attachments: super::materialize_attachments(id, attachments, now),
            created_by: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        Self::write_expense_row(&mut tx, &expense).await?;
        Self::insert_attachments(&mut tx, &expense.attachments).await?;
        tx.commit().await?;

        self.cache.invalidate().await;
        Ok(expense)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Expense>, StoreError> {
        self.fetch_expense(id).await
    }

    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, StoreError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM expenses
            WHERE ($1::text IS NULL OR workspace_id = $1)
              AND ($2::text IS NULL OR project_id = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR lower(category) = lower($4))
              AND ($5::timestamptz IS NULL OR expense_date >= $5)
              AND ($6::timestamptz IS NULL OR expense_date <= $6)
              AND ($7::text IS NULL OR position(
                    $7 IN lower(coalesce(vendor, '') || ' ' || coalesce(description, ''))
                  ) > 0)
            ORDER BY expense_date DESC, created_at DESC
            "#,
            SELECT_COLUMNS
        ))
        .bind(&filter.workspace_id)
        .bind(&filter.project_id)
        .bind(filter.status.map(|s| s.as_str().to_string()))
        .bind(&filter.category)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(filter.search.as_ref().map(|s| s.to_lowercase()))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.0).collect();
        let mut attachments = self.fetch_attachments(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let id = row.0;
                Self::row_to_expense(row, attachments.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn update(
        &self,
        id: Uuid,
        patch: ExpensePatch,
        attachments: Vec<NewAttachment>,
    ) -> Result<Option<Expense>, StoreError> {
        // Read-modify-write through the shared patch application so merge
        // semantics stay identical to the in-memory backend.
        let Some(mut expense) = self.fetch_expense(id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        patch.apply_to(&mut expense);
        expense.updated_at = now;

        let amount_cents = amount_to_cents(&expense.amount)
            .map_err(|_| StoreError::Corrupt(expense.amount.clone()))?;
        let new_attachments = super::materialize_attachments(id, attachments, now);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE expenses
            SET workspace_id = $2, project_id = $3, task_id = $4, expense_date = $5,
                amount = $6, amount_cents = $7, currency = $8, category = $9,
                description = $10, vendor = $11, payment_method = $12, tax_amount = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&expense.workspace_id)
        .bind(&expense.project_id)
        .bind(&expense.task_id)
        .bind(expense.date)
        .bind(&expense.amount)
        .bind(amount_cents)
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(&expense.vendor)
        .bind(&expense.payment_method)
        .bind(&expense.tax_amount)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        Self::insert_attachments(&mut tx, &new_attachments).await?;
        tx.commit().await?;

        expense.attachments.extend(new_attachments);
        self.cache.invalidate().await;
        Ok(Some(expense))
    }

    async fn change_status(
        &self,
        id: Uuid,
        status: ExpenseStatus,
        _actor_id: &str,
    ) -> Result<Option<Expense>, StoreError> {
        let Some(mut expense) = self.fetch_expense(id).await? else {
            return Ok(None);
        };
        if expense.status == status {
            return Ok(Some(expense));
        }

        let now = Utc::now();
        sqlx::query("UPDATE expenses SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;

        expense.status = status;
        expense.updated_at = now;
        self.cache.invalidate().await;
        Ok(Some(expense))
    }

    async fn aggregate_by_category(
        &self,
        filter: &AggregateFilter,
    ) -> Result<BTreeMap<String, i64>, StoreError> {
        if let Some(cached) = self.cache.get(filter).await {
            return Ok(cached);
        }

        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|st| st.as_str().to_string()).collect());

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT lower(category), SUM(amount_cents)::bigint
            FROM expenses
            WHERE project_id = $1
              AND ($2::text IS NULL OR workspace_id = $2)
              AND ($3::text[] IS NULL OR status = ANY($3))
            GROUP BY lower(category)
            "#,
        )
        .bind(&filter.project_id)
        .bind(&filter.workspace_id)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        let totals: BTreeMap<String, i64> = rows.into_iter().collect();
        self.cache.put(filter, totals.clone()).await;
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

        // Fast path: a previous call with this key already created the
        // expense.
        let existing_id: Option<Uuid> =
            sqlx::query_scalar("SELECT expense_id FROM expense_idempotency_keys WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let stale_mapping = match existing_id {
            Some(expense_id) => {
                if let Some(expense) = self.fetch_expense(expense_id).await? {
                    return Ok(IdempotentCreate::Replayed(expense));
                }
                // Mapping survived its expense; supersede it below.
                true
            }
            None => false,
        };

        let expense = self.create(new, attachments, actor_id).await?;

        if stale_mapping {
            sqlx::query(
                r#"
                INSERT INTO expense_idempotency_keys (key, expense_id)
                VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET expense_id = EXCLUDED.expense_id
                "#,
            )
            .bind(key)
            .bind(expense.id)
            .execute(&self.pool)
            .await?;
            return Ok(IdempotentCreate::Created(expense));
        }

        let claimed = sqlx::query(
            r#"
            INSERT INTO expense_idempotency_keys (key, expense_id)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(expense.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            // A concurrent duplicate recorded the mapping between our
            // lookup and our insert. Return the winner's expense and drop
            // ours so exactly one expense exists for this key.
            let winner_id: Option<Uuid> =
                sqlx::query_scalar("SELECT expense_id FROM expense_idempotency_keys WHERE key = $1")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;

            if let Some(winner_id) = winner_id {
                if winner_id != expense.id {
                    if let Some(winner) = self.fetch_expense(winner_id).await? {
                        sqlx::query("DELETE FROM expenses WHERE id = $1")
                            .bind(expense.id)
                            .execute(&self.pool)
                            .await?;
                        self.cache.invalidate().await;
                        tracing::debug!(
                            idempotency_key = %key,
                            winner = %winner_id,
                            discarded = %expense.id,
                            "Duplicate idempotent create resolved to existing expense"
                        );
                        return Ok(IdempotentCreate::Replayed(winner));
                    }
                }
            }

            // The winner's expense is already gone; keep ours and take
            // over the mapping.
            sqlx::query(
                r#"
                INSERT INTO expense_idempotency_keys (key, expense_id)
                VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET expense_id = EXCLUDED.expense_id
                "#,
            )
            .bind(key)
            .bind(expense.id)
            .execute(&self.pool)
            .await?;
        }

        Ok(IdempotentCreate::Created(expense))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExpenseStatus;

    #[test]
    fn test_cache_key_includes_status_set() {
        let final_spend = AggregateFilter::final_spend("p-1");
        let all = AggregateFilter {
            project_id: "p-1".into(),
            workspace_id: None,
            statuses: None,
        };
        assert_ne!(
            AggregateCache::cache_key(&final_spend),
            AggregateCache::cache_key(&all)
        );
    }

    #[test]
    fn test_cache_key_includes_workspace() {
        let scoped = AggregateFilter {
            project_id: "p-1".into(),
            workspace_id: Some("ws-1".into()),
            statuses: Some(vec![ExpenseStatus::Closed]),
        };
        let unscoped = AggregateFilter {
            project_id: "p-1".into(),
            workspace_id: None,
            statuses: Some(vec![ExpenseStatus::Closed]),
        };
        assert_ne!(
            AggregateCache::cache_key(&scoped),
            AggregateCache::cache_key(&unscoped)
        );
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = AggregateCache::new(Duration::ZERO);
        let filter = AggregateFilter::final_spend("p-1");
        cache.put(&filter, BTreeMap::new()).await;
        assert!(cache.get(&filter).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_invalidate() {
        let cache = AggregateCache::new(Duration::from_secs(60));
        let filter = AggregateFilter::final_spend("p-1");
        let mut totals = BTreeMap::new();
        totals.insert("travel".to_string(), 12345i64);

        cache.put(&filter, totals.clone()).await;
        assert_eq!(cache.get(&filter).await, Some(totals));

        cache.invalidate().await;
        assert!(cache.get(&filter).await.is_none());
    }
}
