//! Finance Service
//!
//! Orchestrates the money-safe expense lifecycle. All validation runs
//! before any write, so a returned error guarantees no partial mutation.
//! Post-write side effects (audit entry, domain event, snapshot recompute)
//! are best-effort: a failure there is logged and never rolls back the
//! expense write.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditEntryBuilder, AuditSink};
use crate::domain::money::{amount_to_cents, cents_to_amount, normalize_amount, normalize_currency};
use crate::domain::{
    validate_transition, CategoryLimit, CategoryUsage, DomainError, Expense, ExpensePatch,
    ExpenseStatus, NewExpense, OperationContext, ProjectBudget, ProjectBudgetSnapshot,
};
use crate::error::AppResult;
use crate::events::{event_types, DomainEventSink};
use crate::store::{
    AggregateFilter, BudgetRepository, ExpenseFilter, ExpenseStore, IdempotentCreate,
};

use super::{CreateExpenseInput, UpdateExpenseInput, UpsertBudgetInput};

/// The orchestration layer for expenses and budgets. The only component
/// callers interact with directly.
#[derive(Clone)]
pub struct FinanceService {
    store: Arc<dyn ExpenseStore>,
    budgets: Arc<dyn BudgetRepository>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn DomainEventSink>,
    automation_enabled: bool,
}

impl FinanceService {
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        budgets: Arc<dyn BudgetRepository>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            store,
            budgets,
            audit,
            events,
            automation_enabled: false,
        }
    }

    /// Enable or disable the budget-exceedance automation pass.
    pub fn with_automation(mut self, enabled: bool) -> Self {
        self.automation_enabled = enabled;
        self
    }

    // -------------------------------------------------------------------
    // Expense operations
    // -------------------------------------------------------------------

    /// Create an expense.
    ///
    /// Validates and normalizes the input, runs the write through the
    /// store's idempotency guard, then recomputes the project budget
    /// snapshot and, when automation is enabled, applies the exceedance
    /// pass.
    pub async fn create_expense(
        &self,
        input: CreateExpenseInput,
        ctx: &OperationContext,
    ) -> AppResult<Expense> {
        let (amount, _) = validate_amount(&input.amount)?;
        let tax_amount = input
            .tax_amount
            .as_deref()
            .map(validate_tax)
            .transpose()?;
        let currency = normalize_currency(&input.currency)?;
        let status = match input.status.as_deref() {
            Some(raw) => raw.parse::<ExpenseStatus>()?,
            None => ExpenseStatus::Draft,
        };
        let date = parse_expense_date(&input.date)?;

        if let Some(budget) = self.budgets.find(&input.project_id).await? {
            if budget.currency != currency {
                return Err(DomainError::BudgetCurrencyMismatch {
                    budget: budget.currency,
                    got: currency,
                }
                .into());
            }
        }

        let new = NewExpense {
            workspace_id: input.workspace_id,
            project_id: input.project_id,
            task_id: input.task_id,
            date,
            amount,
            currency,
            category: input.category,
            description: input.description,
            vendor: input.vendor,
            payment_method: input.payment_method,
            tax_amount,
            status,
        };

        let outcome = self
            .store
            .create_idempotent(
                ctx.idempotency_key.as_deref(),
                new,
                input.attachments,
                &ctx.actor_id,
            )
            .await?;

        // A replayed key means the expense already exists and its creation
        // side effects already ran; re-firing them here would double-count
        // the creation downstream.
        let expense = match outcome {
            IdempotentCreate::Replayed(expense) => {
                tracing::info!(
                    expense_id = %expense.id,
                    idempotency_key = ?ctx.idempotency_key,
                    "Idempotent replay, returning existing expense"
                );
                return Ok(expense);
            }
            IdempotentCreate::Created(expense) => expense,
        };

        tracing::info!(
            expense_id = %expense.id,
            project_id = %expense.project_id,
            amount = %expense.amount,
            currency = %expense.currency,
            correlation_id = ?ctx.correlation_id,
            "Expense created"
        );

        self.record_audit(
            AuditEntryBuilder::new(AuditAction::ExpenseCreated, &ctx.actor_id)
                .entity("expense", expense.id)
                .after_state(&expense)
                .build(),
        )
        .await;
        self.emit_event(
            event_types::EXPENSE_CREATED,
            &expense.id.to_string(),
            serde_json::json!({
                "project_id": expense.project_id,
                "amount": expense.amount,
                "currency": expense.currency,
                "category": expense.category,
                "status": expense.status,
            }),
        )
        .await;

        let snapshot = self.refresh_snapshot(&expense.project_id).await;

        if self.automation_enabled {
            if let Some(snapshot) = snapshot {
                return self.run_automation_pass(expense, &snapshot).await;
            }
        }
        Ok(expense)
    }

    /// Fetch one expense.
    pub async fn get_expense(&self, id: Uuid) -> AppResult<Expense> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()).into())
    }

    /// List expenses matching the filter.
    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> AppResult<Vec<Expense>> {
        Ok(self.store.list(filter).await?)
    }

    /// Update an expense.
    ///
    /// Changed fields are re-validated with the same rules as creation; a
    /// status change is validated against the *currently stored* status
    /// and applied as a second step after the field patch.
    pub async fn update_expense(
        &self,
        id: Uuid,
        input: UpdateExpenseInput,
        ctx: &OperationContext,
    ) -> AppResult<Expense> {
        let current = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()))?;

        let mut patch = ExpensePatch {
            category: input.category,
            task_id: input.task_id,
            description: input.description,
            vendor: input.vendor,
            payment_method: input.payment_method,
            ..ExpensePatch::default()
        };

        if let Some(raw) = input.amount.as_deref() {
            let (amount, _) = validate_amount(raw)?;
            patch.amount = Some(amount);
        }
        if let Some(raw) = input.currency.as_deref() {
            let currency = normalize_currency(raw)?;
            if currency != current.currency {
                if let Some(budget) = self.budgets.find(&current.project_id).await? {
                    if budget.currency != currency {
                        return Err(DomainError::BudgetCurrencyMismatch {
                            budget: budget.currency,
                            got: currency,
                        }
                        .into());
                    }
                }
            }
            patch.currency = Some(currency);
        }
        if let Some(raw) = input.date.as_deref() {
            patch.date = Some(parse_expense_date(raw)?);
        }
        patch.tax_amount = input
            .tax_amount
            .try_map(|raw| validate_tax(&raw))?;

        let new_status = input
            .status
            .as_deref()
            .map(str::parse::<ExpenseStatus>)
            .transpose()?;
        if let Some(status) = new_status {
            validate_transition(current.status, status)?;
        }
        let status_changed = new_status.is_some_and(|s| s != current.status);

        let spend_affected = patch.amount.is_some()
            || patch.currency.is_some()
            || patch.date.is_some()
            || !patch.tax_amount.is_keep()
            || status_changed;

        let updated = self
            .store
            .update(id, patch, input.attachments)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()))?;

        let mut result = updated;
        if status_changed {
            // new_status is Some by construction of status_changed
            if let Some(status) = new_status {
                result = self
                    .store
                    .change_status(id, status, &ctx.actor_id)
                    .await?
                    .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()))?;
                self.emit_event(
                    event_types::EXPENSE_STATUS_CHANGED,
                    &id.to_string(),
                    serde_json::json!({
                        "from": current.status,
                        "to": status,
                        "actor_id": ctx.actor_id,
                    }),
                )
                .await;
            }
        }

        let action = if status_changed {
            AuditAction::ExpenseStatusChanged
        } else {
            AuditAction::ExpenseUpdated
        };
        self.record_audit(
            AuditEntryBuilder::new(action, &ctx.actor_id)
                .entity("expense", id)
                .before_state(&current)
                .after_state(&result)
                .build(),
        )
        .await;

        if spend_affected {
            self.refresh_snapshot(&result.project_id).await;
        }

        Ok(result)
    }

    /// Transition an expense to a new status, enforcing the workflow
    /// table. A same-status call is a no-op returning the unchanged
    /// expense.
    pub async fn change_status(
        &self,
        id: Uuid,
        status: &str,
        ctx: &OperationContext,
    ) -> AppResult<Expense> {
        let status: ExpenseStatus = status.parse()?;
        let current = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()))?;

        validate_transition(current.status, status)?;
        if current.status == status {
            return Ok(current);
        }

        let updated = self
            .store
            .change_status(id, status, &ctx.actor_id)
            .await?
            .ok_or_else(|| DomainError::ExpenseNotFound(id.to_string()))?;

        tracing::info!(
            expense_id = %id,
            from = %current.status,
            to = %status,
            "Expense status changed"
        );

        self.record_audit(
            AuditEntryBuilder::new(AuditAction::ExpenseStatusChanged, &ctx.actor_id)
                .entity("expense", id)
                .before_state(&current)
                .after_state(&updated)
                .build(),
        )
        .await;
        self.emit_event(
            event_types::EXPENSE_STATUS_CHANGED,
            &id.to_string(),
            serde_json::json!({
                "from": current.status,
                "to": status,
                "actor_id": ctx.actor_id,
            }),
        )
        .await;

        self.refresh_snapshot(&updated.project_id).await;
        Ok(updated)
    }

    // -------------------------------------------------------------------
    // Budget operations
    // -------------------------------------------------------------------

    /// Build the current budget snapshot for a project, or `None` when no
    /// budget is configured. Always recomputed from the expense store.
    pub async fn get_budget(&self, project_id: &str) -> AppResult<Option<ProjectBudgetSnapshot>> {
        match self.budgets.find(project_id).await? {
            Some(budget) => Ok(Some(self.build_snapshot(budget).await?)),
            None => Ok(None),
        }
    }

    /// Create or replace a project budget, then persist a fresh snapshot
    /// so reads are never stale relative to this write.
    pub async fn upsert_budget(
        &self,
        input: UpsertBudgetInput,
        ctx: &OperationContext,
    ) -> AppResult<ProjectBudgetSnapshot> {
        let currency = normalize_currency(&input.currency)?;
        let total = input
            .total
            .as_deref()
            .map(|raw| validate_amount(raw).map(|(amount, _)| amount))
            .transpose()?;
        if let Some(threshold) = input.warn_threshold {
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(DomainError::InvalidWarnThreshold(threshold.to_string()).into());
            }
        }
        let categories = input
            .categories
            .into_iter()
            .map(|c| {
                let (limit, _) = validate_amount(&c.limit)?;
                Ok(CategoryLimit {
                    name: c.name,
                    limit,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        // Currency is immutable once expenses reference the budget.
        let existing = self
            .store
            .list(&ExpenseFilter {
                project_id: Some(input.project_id.clone()),
                ..ExpenseFilter::default()
            })
            .await?;
        if let Some(conflicting) = existing.iter().find(|e| e.currency != currency) {
            return Err(DomainError::BudgetCurrencyMismatch {
                budget: currency,
                got: conflicting.currency.clone(),
            }
            .into());
        }

        let budget = ProjectBudget {
            project_id: input.project_id,
            currency,
            total,
            warn_threshold: input.warn_threshold,
            categories,
            updated_at: Utc::now(),
        };
        let stored = self.budgets.upsert(budget).await?;

        let snapshot = self.build_snapshot(stored).await?;
        if let Err(error) = self.budgets.save_snapshot(&snapshot).await {
            tracing::warn!(%error, "Failed to persist budget snapshot");
        }

        self.record_audit(
            AuditEntryBuilder::new(AuditAction::ProjectBudgetUpdated, &ctx.actor_id)
                .entity("project_budget", &snapshot.budget.project_id)
                .after_state(&snapshot.budget)
                .build(),
        )
        .await;
        self.emit_event(
            event_types::PROJECT_BUDGET_UPDATED,
            &snapshot.budget.project_id,
            serde_json::json!({
                "currency": snapshot.budget.currency,
                "total": snapshot.budget.total,
            }),
        )
        .await;

        Ok(snapshot)
    }

    // -------------------------------------------------------------------
    // Snapshot builder
    // -------------------------------------------------------------------

    /// Derive a snapshot from the current expense set: final-status spend
    /// per category merged with declared category limits.
    async fn build_snapshot(&self, budget: ProjectBudget) -> AppResult<ProjectBudgetSnapshot> {
        let mut spend = self
            .store
            .aggregate_by_category(&AggregateFilter::final_spend(&budget.project_id))
            .await?;
        let spent_total_cents: i64 = spend.values().sum();

        let mut categories_usage = Vec::with_capacity(budget.categories.len() + spend.len());
        for declared in &budget.categories {
            let spent_cents = spend.remove(&declared.name.to_lowercase()).unwrap_or(0);
            let limit_cents = amount_to_cents(&declared.limit)?;
            categories_usage.push(CategoryUsage {
                name: declared.name.clone(),
                limit: Some(declared.limit.clone()),
                spent: cents_to_amount(spent_cents),
                remaining: Some(cents_to_amount(limit_cents - spent_cents)),
            });
        }
        // Spend in categories no limit was declared for, in sorted order.
        for (category, spent_cents) in spend {
            categories_usage.push(CategoryUsage {
                name: category,
                limit: None,
                spent: cents_to_amount(spent_cents),
                remaining: None,
            });
        }

        let remaining_total = budget
            .total
            .as_deref()
            .map(|total| Ok::<_, DomainError>(cents_to_amount(amount_to_cents(total)? - spent_total_cents)))
            .transpose()?;

        Ok(ProjectBudgetSnapshot {
            budget,
            spent_total: cents_to_amount(spent_total_cents),
            remaining_total,
            categories_usage,
        })
    }

    /// Recompute and persist the snapshot after an expense write.
    /// Best-effort: the expense write already happened and must not be
    /// rolled back, and the snapshot can be re-derived at any time.
    async fn refresh_snapshot(&self, project_id: &str) -> Option<ProjectBudgetSnapshot> {
        let budget = match self.budgets.find(project_id).await {
            Ok(Some(budget)) => budget,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(%error, project_id, "Failed to load budget for snapshot recompute");
                return None;
            }
        };
        match self.build_snapshot(budget).await {
            Ok(snapshot) => {
                if let Err(error) = self.budgets.save_snapshot(&snapshot).await {
                    tracing::warn!(%error, project_id, "Failed to persist budget snapshot");
                }
                Some(snapshot)
            }
            Err(error) => {
                tracing::warn!(%error, project_id, "Failed to recompute budget snapshot");
                None
            }
        }
    }

    // -------------------------------------------------------------------
    // Automation pass
    // -------------------------------------------------------------------

    /// If the projected spend now exceeds the budget total, force the
    /// expense back to `pending` as the system actor and emit breach
    /// telemetry.
    ///
    /// Projected spend is the snapshot's final-status spend plus this
    /// expense's own amount when its status does not count yet, so a
    /// budget-blowing draft is flagged at creation rather than at
    /// approval.
    async fn run_automation_pass(
        &self,
        expense: Expense,
        snapshot: &ProjectBudgetSnapshot,
    ) -> AppResult<Expense> {
        let Some(total) = snapshot.budget.total.as_deref() else {
            return Ok(expense);
        };
        let total_cents = amount_to_cents(total)?;
        let mut spent_cents = amount_to_cents(&snapshot.spent_total)?;
        if !expense.status.is_final() {
            spent_cents += amount_to_cents(&expense.amount)?;
        }
        if spent_cents <= total_cents || expense.status == ExpenseStatus::Pending {
            return Ok(expense);
        }

        let system = OperationContext::system();
        let previous_status = expense.status;
        let exceeded_by = cents_to_amount(spent_cents - total_cents);
        let updated = self
            .store
            .change_status(expense.id, ExpenseStatus::Pending, &system.actor_id)
            .await?
            .unwrap_or(expense);

        tracing::warn!(
            expense_id = %updated.id,
            project_id = %updated.project_id,
            exceeded_by = %exceeded_by,
            "Budget exceeded, expense forced to pending"
        );

        self.record_audit(
            AuditEntryBuilder::new(AuditAction::AutomationTriggered, system.actor_id.as_str())
                .entity("expense", updated.id)
                .details(serde_json::json!({
                    "rule": "budget_exceeded",
                    "previous_status": previous_status,
                    "new_status": ExpenseStatus::Pending,
                    "exceeded_by": exceeded_by,
                }))
                .build(),
        )
        .await;
        self.emit_event(
            event_types::AUTOMATION_TRIGGERED,
            &updated.id.to_string(),
            serde_json::json!({
                "rule": "budget_exceeded",
                "previous_status": previous_status,
                "new_status": ExpenseStatus::Pending,
                "exceeded_by": exceeded_by,
            }),
        )
        .await;
        self.emit_event(
            event_types::PROJECT_BUDGET_EXCEEDED,
            &updated.project_id,
            serde_json::json!({
                "spent_total": snapshot.spent_total,
                "total": total,
                "exceeded_by": exceeded_by,
            }),
        )
        .await;

        Ok(updated)
    }

    // -------------------------------------------------------------------
    // Fire-and-forget sinks
    // -------------------------------------------------------------------

    async fn record_audit(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(error) = self.audit.record(entry).await {
            tracing::warn!(%error, action, "Failed to record audit entry");
        }
    }

    async fn emit_event(&self, event_type: &str, entity_id: &str, payload: serde_json::Value) {
        if let Err(error) = self.events.emit(event_type, entity_id, payload).await {
            tracing::warn!(%error, event_type, "Failed to emit domain event");
        }
    }
}

/// Normalize an amount and require it to be strictly positive.
fn validate_amount(raw: &str) -> Result<(String, i64), DomainError> {
    let cents = amount_to_cents(raw)?;
    if cents <= 0 {
        return Err(DomainError::AmountNotPositive(raw.to_string()));
    }
    Ok((cents_to_amount(cents), cents))
}

/// Normalize a tax amount; must parse and be zero or positive.
fn validate_tax(raw: &str) -> Result<String, DomainError> {
    let normalized =
        normalize_amount(raw).map_err(|_| DomainError::InvalidTax(raw.to_string()))?;
    if normalized.starts_with('-') {
        return Err(DomainError::InvalidTax(raw.to_string()));
    }
    Ok(normalized)
}

/// Parse an expense date (RFC 3339 or plain `YYYY-MM-DD`) and reject
/// anything more than 24 hours in the future.
fn parse_expense_date(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let invalid = || DomainError::InvalidDate(raw.to_string());

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
        date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?.and_utc()
    };

    if parsed > Utc::now() + Duration::hours(24) {
        return Err(invalid());
    }
    Ok(parsed)
}
