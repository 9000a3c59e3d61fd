use anyhow::{Context, Result};
use groundwork_core::store::StoreKind;

use crate::config::{validate_identifier, Config};
use crate::db;

/// Create the pgvector schema used by the persistent store.
///
/// Every statement is `IF NOT EXISTS`, so re-running is safe. The store
/// itself never creates schema; it only verifies it on `initialize()`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    if config.store.kind != StoreKind::Persistent {
        println!("store.type is 'memory'; nothing to migrate.");
        return Ok(());
    }
    let persistent = config
        .store
        .persistent
        .as_ref()
        .context("[store.persistent] is required for migrations")?;
    let dims = config.store.dims;
    let table = persistent.table.as_str();
    validate_identifier(table)?;

    let pool = db::connect(persistent).await?;

    for statement in schema_statements(table, dims) {
        sqlx::query(&statement)
            .execute(&pool)
            .await
            .with_context(|| format!("migration failed: {}", statement))?;
    }

    pool.close().await;
    tracing::info!(table, dims, "schema ready");
    Ok(())
}

fn schema_statements(table: &str, dims: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                chunk_id TEXT NOT NULL,
                source_item_id TEXT NOT NULL,
                source_item_name TEXT NOT NULL,
                origin TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dims}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (source_item_id, chunk_id)
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_embedding ON {table} \
             USING hnsw (embedding vector_cosine_ops)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_source_item_id ON {table}(source_item_id)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_origin ON {table}(origin)"),
    ]
}
