//! Budget domain types
//!
//! Per-project budget limits and the derived usage snapshot. The snapshot
//! is a view recomputed on demand from the expense set; it is never the
//! source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-category spending cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub name: String,
    /// Canonical decimal string, strictly positive.
    pub limit: String,
}

/// Configured budget for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBudget {
    pub project_id: String,
    pub currency: String,
    /// Overall limit as a canonical decimal string; absent means uncapped.
    pub total: Option<String>,
    /// Fraction of `total` at which a warning applies, in [0, 1].
    pub warn_threshold: Option<f64>,
    pub categories: Vec<CategoryLimit>,
    pub updated_at: DateTime<Utc>,
}

/// Actual spend against one category.
///
/// Declared-but-unspent categories appear with `spent = "0.00"`;
/// spent-but-undeclared categories appear with no limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub name: String,
    pub limit: Option<String>,
    pub spent: String,
    /// `limit - spent`; absent when no limit is declared. May be negative.
    pub remaining: Option<String>,
}

/// A budget plus freshly computed spend, derived from final-status expenses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBudgetSnapshot {
    #[serde(flatten)]
    pub budget: ProjectBudget,
    pub spent_total: String,
    /// `total - spent_total`; not clamped, negative signals overrun.
    pub remaining_total: Option<String>,
    pub categories_usage: Vec<CategoryUsage>,
}
