//! Expense domain types
//!
//! The expense record, its attachments, and the approval-workflow status
//! state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::error::DomainError;
use super::patch::Patch;

/// Expense lifecycle status.
///
/// Encodes an approval workflow (draft → review → approve → pay → close)
/// with single-step-back moves for the first three stages. `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Draft,
    Pending,
    Approved,
    Payable,
    Closed,
}

/// Statuses counted toward budget spend.
pub const FINAL_STATUSES: [ExpenseStatus; 3] = [
    ExpenseStatus::Approved,
    ExpenseStatus::Payable,
    ExpenseStatus::Closed,
];

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "draft",
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Payable => "payable",
            ExpenseStatus::Closed => "closed",
        }
    }

    /// Allowed next states from this status, excluding the always-permitted
    /// same-state no-op.
    pub fn allowed_next(&self) -> &'static [ExpenseStatus] {
        match self {
            ExpenseStatus::Draft => &[ExpenseStatus::Pending],
            ExpenseStatus::Pending => &[ExpenseStatus::Approved, ExpenseStatus::Draft],
            ExpenseStatus::Approved => &[ExpenseStatus::Payable, ExpenseStatus::Pending],
            ExpenseStatus::Payable => &[ExpenseStatus::Closed, ExpenseStatus::Approved],
            ExpenseStatus::Closed => &[],
        }
    }

    /// Whether this status counts toward budget spend.
    pub fn is_final(&self) -> bool {
        FINAL_STATUSES.contains(self)
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ExpenseStatus::Draft),
            "pending" => Ok(ExpenseStatus::Pending),
            "approved" => Ok(ExpenseStatus::Approved),
            "payable" => Ok(ExpenseStatus::Payable),
            "closed" => Ok(ExpenseStatus::Closed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Validate a status transition against the workflow table.
///
/// Same-state "transitions" are always a permitted no-op.
///
/// # Errors
/// `DomainError::InvalidStatusTransition` for any move the table does not
/// allow.
pub fn validate_transition(from: ExpenseStatus, to: ExpenseStatus) -> Result<(), DomainError> {
    if from == to || from.allowed_next().contains(&to) {
        Ok(())
    } else {
        Err(DomainError::InvalidStatusTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// A file attached to an expense. Created alongside the expense or appended
/// on update; never independently mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseAttachment {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub filename: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One spend record against a project.
///
/// `amount` and `tax_amount` are canonical decimal strings (two places,
/// normalized by the money codec); `amount` is always strictly positive,
/// `tax_amount` (if present) is zero or positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub workspace_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub date: DateTime<Utc>,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    pub tax_amount: Option<String>,
    pub status: ExpenseStatus,
    pub attachments: Vec<ExpenseAttachment>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating an expense. Produced by the Finance Service
/// after normalization; stores never re-validate.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub workspace_id: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub date: DateTime<Utc>,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub payment_method: Option<String>,
    pub tax_amount: Option<String>,
    pub status: ExpenseStatus,
}

/// Attachment payload accompanying a create or update.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAttachment {
    pub filename: String,
    pub url: String,
}

/// Validated field-level patch for an expense.
///
/// Required fields use `Option` (absent means keep); optional fields use
/// the three-way [`Patch`] so "clear this field" is distinguishable from
/// "leave it alone". Status is deliberately absent: status moves go through
/// `change_status` so the workflow table is always consulted.
#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub task_id: Patch<String>,
    pub description: Patch<String>,
    pub vendor: Patch<String>,
    pub payment_method: Patch<String>,
    pub tax_amount: Patch<String>,
}

impl ExpensePatch {
    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.currency.is_none()
            && self.category.is_none()
            && self.date.is_none()
            && self.task_id.is_keep()
            && self.description.is_keep()
            && self.vendor.is_keep()
            && self.payment_method.is_keep()
            && self.tax_amount.is_keep()
    }

    /// Apply this patch to an expense in place.
    ///
    /// Shared by both store implementations so field-merge semantics cannot
    /// drift between backends. Does not touch `updated_at`.
    pub fn apply_to(&self, expense: &mut Expense) {
        if let Some(amount) = &self.amount {
            expense.amount = amount.clone();
        }
        if let Some(currency) = &self.currency {
            expense.currency = currency.clone();
        }
        if let Some(category) = &self.category {
            expense.category = category.clone();
        }
        if let Some(date) = self.date {
            expense.date = date;
        }
        self.task_id.apply_to(&mut expense.task_id);
        self.description.apply_to(&mut expense.description);
        self.vendor.apply_to(&mut expense.vendor);
        self.payment_method.apply_to(&mut expense.payment_method);
        self.tax_amount.apply_to(&mut expense.tax_amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["draft", "pending", "approved", "payable", "closed"] {
            let status: ExpenseStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "cancelled".parse::<ExpenseStatus>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatus(_)));
    }

    #[test]
    fn test_transition_table_forward_path() {
        use ExpenseStatus::*;
        assert!(validate_transition(Draft, Pending).is_ok());
        assert!(validate_transition(Pending, Approved).is_ok());
        assert!(validate_transition(Approved, Payable).is_ok());
        assert!(validate_transition(Payable, Closed).is_ok());
    }

    #[test]
    fn test_transition_table_single_step_back() {
        use ExpenseStatus::*;
        assert!(validate_transition(Pending, Draft).is_ok());
        assert!(validate_transition(Approved, Pending).is_ok());
        assert!(validate_transition(Payable, Approved).is_ok());
    }

    #[test]
    fn test_transition_table_rejects_skips() {
        use ExpenseStatus::*;
        assert!(validate_transition(Draft, Approved).is_err());
        assert!(validate_transition(Draft, Closed).is_err());
        assert!(validate_transition(Pending, Payable).is_err());
        assert!(validate_transition(Payable, Draft).is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        use ExpenseStatus::*;
        for target in [Draft, Pending, Approved, Payable] {
            assert!(validate_transition(Closed, target).is_err());
        }
        // Same-state no-op is still allowed.
        assert!(validate_transition(Closed, Closed).is_ok());
    }

    #[test]
    fn test_same_state_is_noop_everywhere() {
        use ExpenseStatus::*;
        for status in [Draft, Pending, Approved, Payable, Closed] {
            assert!(validate_transition(status, status).is_ok());
        }
    }

    #[test]
    fn test_final_statuses() {
        use ExpenseStatus::*;
        assert!(!Draft.is_final());
        assert!(!Pending.is_final());
        assert!(Approved.is_final());
        assert!(Payable.is_final());
        assert!(Closed.is_final());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&ExpenseStatus::Payable).unwrap();
        assert_eq!(json, "\"payable\"");
        let status: ExpenseStatus = serde_json::from_str("\"draft\"").unwrap();
        assert_eq!(status, ExpenseStatus::Draft);
    }
}
