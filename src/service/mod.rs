//! Finance Service module
//!
//! The orchestration layer callers interact with: validation and
//! normalization, status-machine enforcement, budget recomputation, and
//! the budget-exceedance automation pass.

mod finance;

use serde::Deserialize;

use crate::domain::{CategoryLimit, NewAttachment, Patch};

pub use finance::FinanceService;

/// Raw creation input. Amount, currency, date and status arrive as strings
/// and are validated/normalized by the service before anything is written.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExpenseInput {
    pub workspace_id: String,
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub date: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub tax_amount: Option<String>,
    /// Defaults to `draft`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

/// Raw update input. Required fields use `Option` (absent means keep);
/// clearable fields use [`Patch`] so JSON `null` means "clear".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExpenseInput {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_id: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub vendor: Patch<String>,
    #[serde(default)]
    pub payment_method: Patch<String>,
    #[serde(default)]
    pub tax_amount: Patch<String>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

/// Raw budget configuration input. `project_id` may be omitted in the
/// body; the HTTP layer always overwrites it from the request path.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertBudgetInput {
    #[serde(default)]
    pub project_id: String,
    pub currency: String,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub warn_threshold: Option<f64>,
    #[serde(default)]
    pub categories: Vec<CategoryLimit>,
}
