//! Postgres persistence layer. Every component upstream of this module
//! depends on the narrow repository traits in [`repositories`], not on
//! `sqlx` directly, following a `ports` + `infrastructure` hexagonal
//! split.

pub mod repositories;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::CoreError;

/// Embeds and applies every `.sql` file under `core/migrations` in
/// order, matching `sqlx::migrate!`'s default convention.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn connect(
    database_url: &str,
    pool_size: u32,
    query_timeout: Duration,
) -> Result<PgPool, CoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(query_timeout)
        .connect(database_url)
        .await
        .map_err(|e| CoreError::Storage(format!("failed to connect to database: {e}")))?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), CoreError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| CoreError::Storage(format!("migration failed: {e}")))?;
    Ok(())
}
