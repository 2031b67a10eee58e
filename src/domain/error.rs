//! Domain Error Types
//!
//! Pure validation errors that don't depend on infrastructure.

use thiserror::Error;

/// Domain-specific errors.
///
/// Every variant is a synchronous pre-write validation failure: when one of
/// these is returned, no expense or budget mutation has happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed decimal amount string
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed or negative tax amount
    #[error("Invalid tax amount: {0}")]
    InvalidTax(String),

    /// Amount is zero or negative
    #[error("Amount must be positive (got {0})")]
    AmountNotPositive(String),

    /// Currency is not a 3-letter code
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Date failed to parse or is more than 24h in the future
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Status value is not one of the known statuses
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Status transition not allowed by the workflow table
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Warn threshold outside [0, 1]
    #[error("Invalid warn threshold: {0}")]
    InvalidWarnThreshold(String),

    /// Expense currency does not match the project budget currency
    #[error("Budget currency mismatch: budget is {budget}, got {got}")]
    BudgetCurrencyMismatch { budget: String, got: String },

    /// Expense not found
    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),
}

impl DomainError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidTax(_) => "invalid_tax",
            Self::AmountNotPositive(_) => "amount_not_positive",
            Self::InvalidCurrency(_) => "invalid_currency",
            Self::InvalidDate(_) => "invalid_date",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::InvalidWarnThreshold(_) => "invalid_warn_threshold",
            Self::BudgetCurrencyMismatch { .. } => "budget_currency_mismatch",
            Self::ExpenseNotFound(_) => "expense_not_found",
        }
    }

    /// Check if this error means the referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ExpenseNotFound(_))
    }
}
