//! Database module
//!
//! Database connection and schema verification utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Create a connection pool from configuration.
///
/// # Errors
/// `ConfigError::MissingEnv` when no `DATABASE_URL` is configured, or the
/// underlying sqlx connect error.
pub async fn create_pool(config: &Config) -> Result<PgPool, crate::error::AppError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(crate::config::ConfigError::MissingEnv("DATABASE_URL"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .map_err(crate::store::StoreError::from)?;

    Ok(pool)
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "expenses",
        "expense_attachments",
        "expense_idempotency_keys",
        "project_budgets",
        "audit_logs",
        "domain_events",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
