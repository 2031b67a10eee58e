//! Domain module
//!
//! Core domain types and business logic.

pub mod budget;
pub mod context;
pub mod error;
pub mod expense;
pub mod money;
pub mod patch;

pub use budget::{CategoryLimit, CategoryUsage, ProjectBudget, ProjectBudgetSnapshot};
pub use context::{OperationContext, SYSTEM_ACTOR};
pub use error::DomainError;
pub use expense::{
    validate_transition, Expense, ExpenseAttachment, ExpensePatch, ExpenseStatus, NewAttachment,
    NewExpense, FINAL_STATUSES,
};
pub use patch::Patch;
