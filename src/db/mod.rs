use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::debug;

pub mod queries;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Creates tables, indexes and the change-notification triggers. Idempotent.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    for statement in queries::SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Schema ensured ({} statements)", queries::SCHEMA.len());
    Ok(())
}
