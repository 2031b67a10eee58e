//! Backend selection
//!
//! Builds the storage bundle (expense store, budget repository, audit and
//! event sinks) for the configured driver. When the postgres driver is
//! selected but unusable, the service falls back to the in-process store
//! rather than failing startup.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, MemoryAuditSink, PgAuditSink};
use crate::config::{Config, StoreDriver};
use crate::db;
use crate::error::AppError;
use crate::events::{DomainEventSink, MemoryDomainEventSink, PgDomainEventSink};
use crate::service::FinanceService;
use crate::store::{
    BudgetRepository, ExpenseStore, MemoryBudgetRepository, MemoryExpenseStore,
    PgBudgetRepository, PgExpenseStore, StoreError,
};

/// The storage collaborators behind the Finance Service.
pub struct Backend {
    pub store: Arc<dyn ExpenseStore>,
    pub budgets: Arc<dyn BudgetRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub events: Arc<dyn DomainEventSink>,
}

impl Backend {
    /// In-process backend: volatile, single-process, no external
    /// dependencies.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryExpenseStore::new()),
            budgets: Arc::new(MemoryBudgetRepository::new()),
            audit: Arc::new(MemoryAuditSink::new()),
            events: Arc::new(MemoryDomainEventSink::new()),
        }
    }

    /// Postgres backend over an existing pool.
    pub fn postgres(pool: PgPool, aggregate_cache_ttl: Duration) -> Self {
        Self {
            store: Arc::new(PgExpenseStore::with_cache_ttl(
                pool.clone(),
                aggregate_cache_ttl,
            )),
            budgets: Arc::new(PgBudgetRepository::new(pool.clone())),
            audit: Arc::new(PgAuditSink::new(pool.clone())),
            events: Arc::new(PgDomainEventSink::new(pool)),
        }
    }

    /// Build the backend for the configured driver, falling back to the
    /// in-process store when postgres is selected but unavailable.
    pub async fn from_config(config: &Config) -> Self {
        match config.store_driver {
            StoreDriver::Memory => {
                tracing::info!("Using in-process expense store");
                Self::in_memory()
            }
            StoreDriver::Postgres => match Self::connect_postgres(config).await {
                Ok(backend) => {
                    tracing::info!("Using postgres expense store");
                    backend
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "Postgres store unavailable, falling back to in-process store"
                    );
                    Self::in_memory()
                }
            },
        }
    }

    async fn connect_postgres(config: &Config) -> Result<Self, AppError> {
        let pool = db::create_pool(config).await?;
        db::verify_connection(&pool)
            .await
            .map_err(StoreError::from)?;
        if !db::check_schema(&pool).await.map_err(StoreError::from)? {
            return Err(AppError::Internal(
                "database schema incomplete, run migrations".to_string(),
            ));
        }
        Ok(Self::postgres(
            pool,
            Duration::from_secs(config.aggregate_cache_ttl_secs),
        ))
    }

    /// Wire a Finance Service over this backend.
    pub fn finance_service(&self, config: &Config) -> FinanceService {
        FinanceService::new(
            self.store.clone(),
            self.budgets.clone(),
            self.audit.clone(),
            self.events.clone(),
        )
        .with_automation(config.automation_enabled)
    }
}
