//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Expense, ExpenseStatus, OperationContext, ProjectBudgetSnapshot};
use crate::error::AppError;
use crate::service::{
    CreateExpenseInput, FinanceService, UpdateExpenseInput, UpsertBudgetInput,
};
use crate::store::ExpenseFilter;

const ACTOR_HEADER: &str = "x-actor-id";
const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FinanceService>,
}

/// Build the API router.
pub fn create_router(service: Arc<FinanceService>) -> Router {
    Router::new()
        .route("/expenses", post(create_expense).get(list_expenses))
        .route("/expenses/:id", get(get_expense).patch(update_expense))
        .route("/expenses/:id/status", post(change_status))
        .route(
            "/projects/:project_id/budget",
            get(get_budget).put(upsert_budget),
        )
        .with_state(AppState { service })
}

/// Build the operation context from request headers. Unauthenticated
/// callers act as `anonymous`; real identity comes from the platform's
/// auth layer upstream of this service.
fn context_from_headers(headers: &HeaderMap) -> OperationContext {
    let actor_id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");
    let mut ctx = OperationContext::new(actor_id);
    if let Some(key) = headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_idempotency_key(key);
    }
    // Carry the middleware-assigned request id as the correlation id.
    if let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok())
    {
        ctx = ctx.with_correlation_id(request_id);
    }
    ctx
}

// =========================================================================
// Expense endpoints
// =========================================================================

async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateExpenseInput>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let ctx = context_from_headers(&headers);
    let expense = state.service.create_expense(input, &ctx).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[derive(Debug, Deserialize)]
struct ListExpensesQuery {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    search: Option<String>,
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ListExpensesQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExpenseStatus>)
        .transpose()?;
    let filter = ExpenseFilter {
        workspace_id: query.workspace_id,
        project_id: query.project_id,
        status,
        category: query.category,
        date_from: query.date_from,
        date_to: query.date_to,
        search: query.search,
    };
    let expenses = state.service.list_expenses(&filter).await?;
    Ok(Json(expenses))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Expense>, AppError> {
    let expense = state.service.get_expense(id).await?;
    Ok(Json(expense))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateExpenseInput>,
) -> Result<Json<Expense>, AppError> {
    let ctx = context_from_headers(&headers);
    let expense = state.service.update_expense(id, input, &ctx).await?;
    Ok(Json(expense))
}

#[derive(Debug, Deserialize)]
struct ChangeStatusRequest {
    status: String,
}

async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<Expense>, AppError> {
    let ctx = context_from_headers(&headers);
    let expense = state
        .service
        .change_status(id, &request.status, &ctx)
        .await?;
    Ok(Json(expense))
}

// =========================================================================
// Budget endpoints
// =========================================================================

/// Returns `null` when no budget is configured for the project.
async fn get_budget(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Option<ProjectBudgetSnapshot>>, AppError> {
    let snapshot = state.service.get_budget(&project_id).await?;
    Ok(Json(snapshot))
}

async fn upsert_budget(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(mut input): Json<UpsertBudgetInput>,
) -> Result<Json<ProjectBudgetSnapshot>, AppError> {
    // The path wins over whatever project id the body carries.
    input.project_id = project_id;
    let ctx = context_from_headers(&headers);
    let snapshot = state.service.upsert_budget(input, &ctx).await?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults_to_anonymous() {
        let ctx = context_from_headers(&HeaderMap::new());
        assert_eq!(ctx.actor_id, "anonymous");
        assert!(ctx.idempotency_key.is_none());
        assert!(ctx.correlation_id.is_none());
    }

    #[test]
    fn test_context_reads_headers() {
        let request_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, "user-7".parse().unwrap());
        headers.insert(IDEMPOTENCY_HEADER, "req-1".parse().unwrap());
        headers.insert(REQUEST_ID_HEADER, request_id.to_string().parse().unwrap());

        let ctx = context_from_headers(&headers);
        assert_eq!(ctx.actor_id, "user-7");
        assert_eq!(ctx.idempotency_key.as_deref(), Some("req-1"));
        assert_eq!(ctx.correlation_id, Some(request_id));
    }

    #[test]
    fn test_non_uuid_request_id_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "not-a-uuid".parse().unwrap());
        let ctx = context_from_headers(&headers);
        assert!(ctx.correlation_id.is_none());
    }
}
