use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use groundwork_core::error::{RagError, Result};

use crate::config::PersistentStoreConfig;

/// Open a Postgres pool for the persistent store.
///
/// The acquire timeout is long on purpose: an exhausted pool makes callers
/// wait instead of failing.
pub async fn connect(config: &PersistentStoreConfig) -> Result<PgPool> {
    let url = config.resolve_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&url)
        .await
        .map_err(|e| RagError::Storage(format!("failed to connect to Postgres: {}", e)))?;

    Ok(pool)
}
