use crate::config::DatabaseConfig;
use regex::Regex;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::OnceLock;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn enable_pgvector(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

fn table_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").ok())
        .as_ref()
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
/// Uppercase is rejected: Postgres folds unquoted names to lowercase, and
/// `table_exists` compares against the folded name.
pub fn is_valid_table_name(name: &str) -> bool {
    table_name_pattern().is_some_and(|re| re.is_match(name))
}
