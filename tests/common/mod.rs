//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Setup test database - truncate ledger tables for a fresh state.
///
/// Requires DATABASE_URL; the Postgres-backed tests that call this are
/// `#[ignore]`d so the default suite runs without a database.
#[allow(dead_code)]
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query(
        "TRUNCATE TABLE expense_attachments, expense_idempotency_keys, expenses, \
         project_budgets, audit_logs, domain_events CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}
