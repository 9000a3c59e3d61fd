//! Persistent approximate [`VectorStore`] on PostgreSQL + pgvector.
//!
//! One row per chunk in a table created by `gw init` (see
//! [`migrate`](crate::migrate)). Search is a single `ORDER BY embedding <=> $q`
//! query served by the HNSW `vector_cosine_ops` index, so results are
//! approximate; similarity is reported as `1 - cosine_distance`.
//!
//! The distance is the only `ORDER BY` key, otherwise the planner cannot use
//! the index. Ties within the returned page are re-ordered by chunk id on the
//! client; which of several equally distant rows make the `LIMIT` cut is up
//! to the index.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ initialize() ──▶ store / search / clear / count ──▶ close()
//!   └── any method before initialize() or after close() ─▶ NotInitialized
//! ```
//!
//! `initialize()` verifies connectivity, the `vector` extension, the table,
//! and the `embedding` column dimension. It never creates schema.
//!
//! Vectors are bound with [`pgvector::Vector`] through its sqlx integration.

use std::sync::Mutex;

use async_trait::async_trait;
use groundwork_core::error::{RagError, Result};
use groundwork_core::models::{Chunk, ChunkMetadata, ChunkOrigin, EmbeddingVector, SearchResult};
use groundwork_core::store::{rank_order, StoreKind, VectorStore};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::config::{validate_identifier, PersistentStoreConfig};
use crate::db;

pub struct PgVectorStore {
    config: PersistentStoreConfig,
    dims: usize,
    pool: Mutex<Option<PgPool>>,
}

impl PgVectorStore {
    /// Build an unconnected store. Call [`initialize`](Self::initialize) before use.
    pub fn new(config: PersistentStoreConfig, dims: usize) -> Result<Self> {
        validate_identifier(&config.table)?;
        if dims == 0 {
            return Err(RagError::config("store.dims must be > 0"));
        }
        Ok(Self {
            config,
            dims,
            pool: Mutex::new(None),
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Connect and verify the schema. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        if self.current_pool()?.is_some() {
            return Ok(());
        }

        let pool = db::connect(&self.config).await?;
        if let Err(e) = self.verify(&pool).await {
            pool.close().await;
            return Err(e);
        }

        let loser = {
            let mut slot = self.slot()?;
            if slot.is_none() {
                *slot = Some(pool);
                None
            } else {
                Some(pool)
            }
        };
        match loser {
            // lost a concurrent initialize; keep the winner's pool
            Some(pool) => pool.close().await,
            None => tracing::info!(
                table = %self.config.table,
                dims = self.dims,
                "persistent vector store ready"
            ),
        }
        Ok(())
    }

    async fn verify(&self, pool: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|e| RagError::Storage(format!("connectivity check failed: {}", e)))?;

        let has_extension: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')")
                .fetch_one(pool)
                .await
                .map_err(RagError::storage)?;
        if !has_extension {
            return Err(RagError::Storage(
                "pgvector extension is not installed; run `gw init`".to_string(),
            ));
        }

        let has_table: bool = sqlx::query_scalar("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(&self.config.table)
            .fetch_one(pool)
            .await
            .map_err(RagError::storage)?;
        if !has_table {
            return Err(RagError::Storage(format!(
                "table '{}' does not exist; run `gw init`",
                self.config.table
            )));
        }

        // pgvector stores the declared dimension as the column typmod
        let typmod: Option<i32> = sqlx::query_scalar(
            "SELECT a.atttypmod FROM pg_attribute a \
             WHERE a.attrelid = to_regclass($1::text) AND a.attname = 'embedding' AND NOT a.attisdropped",
        )
        .bind(&self.config.table)
        .fetch_optional(pool)
        .await
        .map_err(RagError::storage)?;
        match typmod {
            None => Err(RagError::Storage(format!(
                "table '{}' has no embedding column",
                self.config.table
            ))),
            Some(d) if d > 0 && d as usize == self.dims => Ok(()),
            Some(d) => Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: d.max(0) as usize,
            }),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<PgPool>>> {
        self.pool
            .lock()
            .map_err(|_| RagError::Storage("pool lock poisoned".to_string()))
    }

    fn current_pool(&self) -> Result<Option<PgPool>> {
        Ok(self.slot()?.clone())
    }

    fn pool(&self) -> Result<PgPool> {
        self.current_pool()?.ok_or_else(|| {
            RagError::NotInitialized(format!(
                "persistent store '{}' is not initialized",
                self.config.table
            ))
        })
    }

    fn check_dims(&self, actual: usize) -> Result<()> {
        if actual != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual,
            });
        }
        Ok(())
    }

    /// Upsert `vectors` in one transaction, first deleting `replace`'s rows
    /// when given. Any failure rolls the whole transaction back.
    async fn write_batch(
        &self,
        pool: &PgPool,
        replace: Option<&str>,
        vectors: &[EmbeddingVector],
    ) -> Result<()> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| RagError::Transaction(format!("begin failed: {}", e)))?;

        let outcome = async {
            if let Some(item) = replace {
                let sql = format!("DELETE FROM {} WHERE source_item_id = $1", self.config.table);
                sqlx::query(&sql)
                    .bind(item)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| format!("delete of '{}' failed: {}", item, e))?;
            }
            let sql = self.upsert_sql();
            for v in vectors {
                bind_upsert(&sql, v)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| format!("write of chunk {} failed: {}", v.chunk_id, e))?;
            }
            Ok::<(), String>(())
        }
        .await;

        if let Err(reason) = outcome {
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, table = %self.config.table, "rollback failed");
            }
            return Err(RagError::Transaction(format!(
                "batch of {} rolled back: {}",
                vectors.len(),
                reason
            )));
        }

        tx.commit()
            .await
            .map_err(|e| RagError::Transaction(format!("commit failed: {}", e)))
    }

    /// Top-K query. `$1` is the query vector, `$2` the limit and `$3` the
    /// scope when `scoped`.
    fn search_sql(&self, scoped: bool) -> String {
        let filter = if scoped {
            " WHERE source_item_id = $3"
        } else {
            ""
        };
        format!(
            "SELECT chunk_id, source_item_id, source_item_name, origin, chunk_index, \
             total_chunks, content, embedding <=> $1 AS distance \
             FROM {t}{filter} ORDER BY embedding <=> $1 LIMIT $2",
            t = self.config.table,
        )
    }

    fn upsert_sql(&self) -> String {
        format!(
            r#"
            INSERT INTO {t} (id, chunk_id, source_item_id, source_item_name, origin,
                             chunk_index, total_chunks, content, embedding, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (source_item_id, chunk_id) DO UPDATE SET
                source_item_name = EXCLUDED.source_item_name,
                origin = EXCLUDED.origin,
                chunk_index = EXCLUDED.chunk_index,
                total_chunks = EXCLUDED.total_chunks,
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                updated_at = NOW()
            "#,
            t = self.config.table
        )
    }
}

fn bind_upsert<'q>(
    sql: &'q str,
    v: &'q EmbeddingVector,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(sql)
        .bind(&v.id)
        .bind(&v.chunk_id)
        .bind(&v.chunk.source_item_id)
        .bind(&v.chunk.source_item_name)
        .bind(v.chunk.metadata.origin.as_str())
        .bind(v.chunk.metadata.chunk_index as i32)
        .bind(v.chunk.metadata.total_chunks as i32)
        .bind(&v.chunk.content)
        .bind(Vector::from(v.vector.clone()))
}

/// Cosine similarity from a pgvector `<=>` distance.
///
/// pgvector yields NaN when either side has zero norm; that scores `0`, the
/// same as the in-memory store.
fn similarity_from_distance(distance: f64) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    ((1.0 - distance) as f32).clamp(-1.0, 1.0)
}

fn row_to_result(row: &PgRow) -> Result<SearchResult> {
    let origin: String = row.try_get("origin").map_err(RagError::storage)?;
    let origin = ChunkOrigin::parse(&origin)
        .ok_or_else(|| RagError::Storage(format!("unknown chunk origin '{}'", origin)))?;
    let chunk_index: i32 = row.try_get("chunk_index").map_err(RagError::storage)?;
    let total_chunks: i32 = row.try_get("total_chunks").map_err(RagError::storage)?;
    let distance: f64 = row.try_get("distance").map_err(RagError::storage)?;

    Ok(SearchResult {
        chunk: Chunk {
            id: row.try_get("chunk_id").map_err(RagError::storage)?,
            source_item_id: row.try_get("source_item_id").map_err(RagError::storage)?,
            source_item_name: row.try_get("source_item_name").map_err(RagError::storage)?,
            content: row.try_get("content").map_err(RagError::storage)?,
            metadata: ChunkMetadata {
                origin,
                chunk_index: chunk_index.max(0) as usize,
                total_chunks: total_chunks.max(0) as usize,
            },
        },
        similarity: similarity_from_distance(distance),
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }

    async fn store(&self, vector: EmbeddingVector) -> Result<()> {
        let pool = self.pool()?;
        self.check_dims(vector.dims())?;
        let sql = self.upsert_sql();
        bind_upsert(&sql, &vector)
            .execute(&pool)
            .await
            .map_err(RagError::storage)?;
        Ok(())
    }

    async fn store_batch(&self, vectors: Vec<EmbeddingVector>) -> Result<()> {
        let pool = self.pool()?;
        if vectors.is_empty() {
            return Ok(());
        }
        for v in &vectors {
            self.check_dims(v.dims())?;
        }

        self.write_batch(&pool, None, &vectors).await?;
        tracing::debug!(count = vectors.len(), table = %self.config.table, "stored batch");
        Ok(())
    }

    async fn replace_item(
        &self,
        source_item_id: &str,
        vectors: Vec<EmbeddingVector>,
    ) -> Result<()> {
        let pool = self.pool()?;
        for v in &vectors {
            if v.chunk.source_item_id != source_item_id {
                return Err(RagError::Storage(format!(
                    "replacement for '{}' contains vectors of another item",
                    source_item_id
                )));
            }
            self.check_dims(v.dims())?;
        }

        self.write_batch(&pool, Some(source_item_id), &vectors).await?;
        tracing::debug!(
            item = source_item_id,
            count = vectors.len(),
            table = %self.config.table,
            "replaced item vectors"
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let pool = self.pool()?;
        self.check_dims(query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let sql = self.search_sql(scope_id.is_some());
        let mut q = sqlx::query(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(top_k as i64);
        if let Some(scope) = scope_id {
            q = q.bind(scope);
        }
        let rows = q.fetch_all(&pool).await.map_err(RagError::storage)?;

        let mut results = rows.iter().map(row_to_result).collect::<Result<Vec<_>>>()?;
        // chunk-id tie-break within the page
        results.sort_by(rank_order);
        Ok(results)
    }

    async fn clear(&self, scope_id: Option<&str>) -> Result<()> {
        let pool = self.pool()?;
        let t = &self.config.table;
        let result = match scope_id {
            Some(scope) => {
                let sql = format!("DELETE FROM {} WHERE source_item_id = $1", t);
                sqlx::query(&sql).bind(scope).execute(&pool).await
            }
            None => {
                let sql = format!("DELETE FROM {}", t);
                sqlx::query(&sql).execute(&pool).await
            }
        }
        .map_err(RagError::storage)?;
        tracing::debug!(deleted = result.rows_affected(), scope = ?scope_id, "cleared vectors");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let pool = self.pool()?;
        let sql = format!("SELECT COUNT(*) FROM {}", self.config.table);
        let n: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&pool)
            .await
            .map_err(RagError::storage)?;
        Ok(n.max(0) as usize)
    }

    async fn close(&self) {
        let pool = match self.slot() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!(table = %self.config.table, "persistent vector store closed");
        }
    }
}
