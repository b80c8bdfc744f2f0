use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Opens the PostgreSQL pool backing the derived-state store. The pool size
/// comes from `Config::db_max_connections`; every handler shares this pool
/// through `PgDerivedStateStore`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to the derived-state database (pool size {max_connections})");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("Derived-state database pool ready");
    Ok(pool)
}
