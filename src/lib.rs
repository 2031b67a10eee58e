//! expense_ledger Library
//!
//! Project expense and budget ledger: money-safe expense lifecycle,
//! idempotent writes, and derived budget-usage computation over two
//! interchangeable storage backends.

pub mod api;
pub mod audit;
pub mod backend;
pub mod config;
pub mod db;
pub mod domain;
pub mod events;
pub mod service;
pub mod store;

mod error;

pub use backend::Backend;
pub use config::{Config, StoreDriver};
pub use domain::{
    DomainError, Expense, ExpenseAttachment, ExpenseStatus, OperationContext, Patch,
    ProjectBudget, ProjectBudgetSnapshot,
};
pub use error::{AppError, AppResult};
pub use service::FinanceService;
