//! SQLite storage for records, chunks, and embeddings (§4C Vector Store).
//!
//! Provides sync methods that internally use a tokio runtime to execute
//! async sqlx operations, the same sync-over-async shape the teacher uses
//! so the rest of the crate (parser, retriever, orchestrator) never has to
//! be async itself.

pub mod predicates;

/// Helper types and embedding conversion functions.
pub(crate) mod helpers;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::runtime::Runtime;

pub use helpers::{ChunkMatch, IndexStats, ModelInfo, StoreError};
pub use helpers::CURRENT_SCHEMA_VERSION;
pub use predicates::{LogicalOperator, StructuredPredicate, TextPredicate};

use helpers::{bytes_to_embedding, embedding_to_bytes, ChunkRow};
use predicates::compose_where;

use crate::record::{Record, RecordSummary};
use crate::serializer::SerializedChunk;

/// Thread-safe SQLite store for records, chunks, and embeddings.
///
/// Uses a connection pool in WAL mode. All methods are synchronous; each
/// blocks on an internal tokio runtime to drive the underlying sqlx calls.
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) rt: Runtime,
    closed: AtomicBool,
}

impl Store {
    /// Open (creating if absent) the database at `path`, applying WAL/PRAGMA
    /// tuning and checking schema/model compatibility against `metadata`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let rt = Runtime::new().map_err(|e| StoreError::Runtime(e.to_string()))?;

        let path_str = path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = rt.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .idle_timeout(std::time::Duration::from_secs(300))
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA cache_size = -16384").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA temp_store = MEMORY").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA mmap_size = 268435456").execute(&mut *conn).await?;
                        Ok(())
                    })
                })
                .connect(&db_url)
                .await
        })?;

        let store = Self {
            pool,
            rt,
            closed: AtomicBool::new(false),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let restrictive = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, restrictive.clone());
            let _ = std::fs::set_permissions(path.with_extension("db-wal"), restrictive.clone());
            let _ = std::fs::set_permissions(path.with_extension("db-shm"), restrictive);
        }

        tracing::info!(path = %path.display(), "index database connected");
        Ok(store)
    }

    /// Create schema and persist model metadata (§6: schema version, model
    /// name, dimensions). Idempotent via `CREATE TABLE IF NOT EXISTS`.
    pub fn init(&self, model_info: &ModelInfo) -> Result<(), StoreError> {
        self.rt.block_on(async {
            let schema = include_str!("schema.sql");
            for statement in schema.split(';') {
                let stmt: String = statement
                    .lines()
                    .skip_while(|line| {
                        let t = line.trim();
                        t.is_empty() || t.starts_with("--")
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let stmt = stmt.trim();
                if stmt.is_empty() {
                    continue;
                }
                sqlx::query(stmt).execute(&self.pool).await?;
            }

            let now = chrono::Utc::now().to_rfc3339();
            for (key, value) in [
                ("schema_version", CURRENT_SCHEMA_VERSION.to_string()),
                ("model_name", model_info.name.clone()),
                ("dimensions", model_info.dimensions.to_string()),
                ("created_at", now),
            ] {
                sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)")
                    .bind(key)
                    .bind(value)
                    .execute(&self.pool)
                    .await?;
            }

            tracing::info!(schema_version = CURRENT_SCHEMA_VERSION, "schema initialized");
            Ok(())
        })
    }

    /// Verify the store's persisted schema/model metadata against the
    /// currently-configured model (§6 "model mismatch is fatal"). Call after
    /// `open()` on an existing store, before issuing queries.
    pub fn check_compatibility(&self, model_info: &ModelInfo) -> Result<(), StoreError> {
        self.rt.block_on(async {
            let row: Option<(String,)> =
                match sqlx::query_as("SELECT value FROM metadata WHERE key = 'schema_version'")
                    .fetch_optional(&self.pool)
                    .await
                {
                    Ok(r) => r,
                    Err(sqlx::Error::Database(e)) if e.message().contains("no such table") => {
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };
            let version: i32 = row.and_then(|(s,)| s.parse().ok()).unwrap_or(0);
            if version > CURRENT_SCHEMA_VERSION {
                return Err(StoreError::SchemaNewerThanEngine(version));
            }
            if version < CURRENT_SCHEMA_VERSION && version > 0 {
                return Err(StoreError::SchemaMismatch(version, CURRENT_SCHEMA_VERSION));
            }

            let model_row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM metadata WHERE key = 'model_name'")
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((stored,)) = model_row {
                if !stored.is_empty() && stored != model_info.name {
                    return Err(StoreError::ModelMismatch(stored, model_info.name.clone()));
                }
            }

            let dim_row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM metadata WHERE key = 'dimensions'")
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((s,)) = dim_row {
                if let Ok(stored_dim) = s.parse::<u32>() {
                    if stored_dim != model_info.dimensions {
                        return Err(StoreError::DimensionMismatch(stored_dim, model_info.dimensions));
                    }
                }
            }
            Ok(())
        })
    }

    /// Atomically replace a record's summary columns and all of its chunks
    /// (§5 "re-indexing a record must appear atomic to readers"). Deletes
    /// the record's existing chunks and summary row, then inserts the new
    /// ones, all within one transaction — a concurrent reader sees either
    /// the old or the new generation, never a partial mix.
    pub fn upsert(
        &self,
        record: &Record,
        chunks: &[(SerializedChunk, Vec<f32>)],
    ) -> Result<(), StoreError> {
        let summary = RecordSummary::from_record(record);
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let now = chrono::Utc::now().to_rfc3339();

            sqlx::query(
                "INSERT INTO records (record_id, project, type_id, status_id, status_date, updater, creator, responsible_employee, contact_email, area, remarks, urgent, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(record_id) DO UPDATE SET
                    project = excluded.project, type_id = excluded.type_id, status_id = excluded.status_id,
                    status_date = excluded.status_date, updater = excluded.updater, creator = excluded.creator,
                    responsible_employee = excluded.responsible_employee, contact_email = excluded.contact_email,
                    area = excluded.area, remarks = excluded.remarks, urgent = excluded.urgent,
                    updated_at = excluded.updated_at",
            )
            .bind(&summary.record_id)
            .bind(&summary.project)
            .bind(summary.type_id)
            .bind(summary.status_id)
            .bind(&summary.status_date)
            .bind(&summary.updater)
            .bind(&summary.creator)
            .bind(&summary.responsible_employee)
            .bind(&summary.contact_email)
            .bind(&summary.area)
            .bind(&summary.remarks)
            .bind(summary.urgent.map(|b| b as i64))
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM chunks WHERE record_id = ?1")
                .bind(&summary.record_id)
                .execute(&mut *tx)
                .await?;

            for (chunk, embedding) in chunks {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO chunks (record_id, chunk_index, text, embedding, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                )
                .bind(&chunk.record_id)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.text)
                .bind(embedding_to_bytes(embedding))
                .bind(chunk.metadata.to_string())
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM chunks_fts WHERE rowid = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO chunks_fts (rowid, text) VALUES (?1, ?2)")
                    .bind(id)
                    .bind(&chunk.text)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    /// Remove a set of records and all of their chunks.
    pub fn delete_by_record_ids(&self, record_ids: &[String]) -> Result<u64, StoreError> {
        if record_ids.is_empty() {
            return Ok(0);
        }
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let mut deleted = 0u64;
            for id in record_ids {
                sqlx::query(
                    "DELETE FROM chunks_fts WHERE rowid IN (SELECT id FROM chunks WHERE record_id = ?1)",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM chunks WHERE record_id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                let result = sqlx::query("DELETE FROM records WHERE record_id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                deleted += result.rows_affected();
            }
            tx.commit().await?;
            Ok(deleted)
        })
    }

    /// Rank chunks by cosine similarity against `vector`, restricted to rows
    /// matching `structured`/`textual` predicates (combined with `operator`)
    /// and at or above `threshold`. Always returns up to `k` matches — never
    /// silently truncates below `k` because of an internal candidate-pool
    /// cap (§4C "MUST NOT silently truncate below k"): if SQL-level
    /// filtering plus in-memory ranking yields fewer than `k` matches, that
    /// reflects the true candidate pool, not an implementation shortcut.
    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        structured: &[StructuredPredicate],
        textual: &[TextPredicate],
        operator: LogicalOperator,
        threshold: f32,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        let rows = self.fetch_candidate_rows(structured, textual, operator)?;

        let mut scored: Vec<ChunkMatch> = rows
            .into_iter()
            .filter_map(|row| {
                let embedding = bytes_to_embedding(&row.embedding)?;
                let sim = crate::math::cosine_similarity(vector, &embedding)?;
                if sim < threshold {
                    return None;
                }
                Some(ChunkMatch {
                    record_id: row.record_id,
                    chunk_index: row.chunk_index,
                    text: row.text,
                    raw_similarity: sim,
                })
            })
            .collect();

        // Tie-break on record_id ascending for deterministic ordering (§4E).
        scored.sort_by(|a, b| {
            b.raw_similarity
                .partial_cmp(&a.raw_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Count how many chunks match the same predicates/threshold a `query`
    /// call would use, without materializing embeddings for anything beyond
    /// the threshold check (§4E "count queries use the same predicate and
    /// threshold logic as ranking queries, just without a k-limit").
    pub fn count_matching(
        &self,
        vector: &[f32],
        structured: &[StructuredPredicate],
        textual: &[TextPredicate],
        operator: LogicalOperator,
        threshold: f32,
    ) -> Result<usize, StoreError> {
        let rows = self.fetch_candidate_rows(structured, textual, operator)?;
        let count = rows
            .into_iter()
            .filter_map(|row| bytes_to_embedding(&row.embedding))
            .filter(|embedding| {
                crate::math::cosine_similarity(vector, embedding).is_some_and(|sim| sim >= threshold)
            })
            .count();
        Ok(count)
    }

    fn fetch_candidate_rows(
        &self,
        structured: &[StructuredPredicate],
        textual: &[TextPredicate],
        operator: LogicalOperator,
    ) -> Result<Vec<ChunkRow>, StoreError> {
        let where_clause = compose_where(structured, textual, operator);

        self.rt.block_on(async {
            let base = "SELECT chunks.id, chunks.record_id, chunks.chunk_index, chunks.text, chunks.embedding \
                         FROM chunks JOIN records ON records.record_id = chunks.record_id";

            let (sql, binds) = match where_clause {
                Some((clause, binds)) => (format!("{base} WHERE {clause}"), binds),
                None => (base.to_string(), Vec::new()),
            };

            let mut query = sqlx::query(&sql);
            for bind in &binds {
                query = match bind {
                    predicates::SqlValue::Int(i) => query.bind(*i),
                    predicates::SqlValue::Text(s) => query.bind(s.clone()),
                };
            }

            use sqlx::Row;
            let rows = query.fetch_all(&self.pool).await?;
            Ok(rows
                .into_iter()
                .map(|r| ChunkRow {
                    id: r.get::<i64, _>("id"),
                    record_id: r.get::<String, _>("record_id"),
                    chunk_index: r.get::<i64, _>("chunk_index"),
                    text: r.get::<String, _>("text"),
                    embedding: r.get::<Vec<u8>, _>("embedding"),
                })
                .collect())
        })
    }

    /// Fetch a single record's summary, if present.
    pub fn get_record_summary(&self, record_id: &str) -> Result<Option<RecordSummary>, StoreError> {
        self.rt.block_on(async {
            use sqlx::Row;
            let row = sqlx::query(
                "SELECT record_id, project, type_id, status_id, status_date, updater, creator, responsible_employee, contact_email, area, remarks, urgent FROM records WHERE record_id = ?1",
            )
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|r| RecordSummary {
                record_id: r.get("record_id"),
                project: r.get("project"),
                type_id: r.get("type_id"),
                status_id: r.get("status_id"),
                status_date: r.get("status_date"),
                updater: r.get("updater"),
                creator: r.get("creator"),
                responsible_employee: r.get("responsible_employee"),
                contact_email: r.get("contact_email"),
                area: r.get("area"),
                remarks: r.get("remarks"),
                urgent: r.get::<Option<i64>, _>("urgent").map(|v| v != 0),
            }))
        })
    }

    /// Every chunk embedding stored for a record, in `chunk_index` order —
    /// used by the similar-by-id path (§4E), which averages or otherwise
    /// combines a source record's chunk vectors rather than re-embedding.
    pub fn chunk_embeddings_for_record(&self, record_id: &str) -> Result<Vec<Vec<f32>>, StoreError> {
        self.rt.block_on(async {
            use sqlx::Row;
            let rows = sqlx::query(
                "SELECT embedding FROM chunks WHERE record_id = ?1 ORDER BY chunk_index ASC",
            )
            .bind(record_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .filter_map(|r| bytes_to_embedding(&r.get::<Vec<u8>, _>("embedding")))
                .collect())
        })
    }

    /// FTS5-accelerated keyword search over chunk text, returning matching
    /// record ids ranked by FTS relevance. Used as the textual layer's
    /// ranked-list input to RRF fusion (§4E); plain LIKE predicates remain
    /// the ground-truth filtering contract regardless of whether this path
    /// is available.
    pub fn search_fts(&self, query_text: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.rt.block_on(async {
            use sqlx::Row;
            let rows = sqlx::query(
                "SELECT chunks.record_id FROM chunks_fts
                 JOIN chunks ON chunks.id = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .bind(query_text)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await;

            // FTS5 MATCH syntax errors on free-form natural language input
            // (unbalanced quotes, bare operators); degrade to no results
            // rather than failing the whole search.
            match rows {
                Ok(rows) => Ok(rows.into_iter().map(|r| r.get::<String, _>("record_id")).collect()),
                Err(e) => {
                    tracing::debug!(error = %e, "fts query failed, degrading to empty result");
                    Ok(Vec::new())
                }
            }
        })
    }

    /// Combine two ranked record-id lists via Reciprocal Rank Fusion, K=60
    /// (§4E). Each list contributes `1.0/(K+rank+1.0)` per record id it
    /// contains; scores sum across lists, duplicates included once with
    /// combined score.
    pub fn rrf_fuse(semantic_ids: &[String], fts_ids: &[String], limit: usize) -> Vec<(String, f32)> {
        const K: f32 = 60.0;
        let mut scores: std::collections::HashMap<&str, f32> = std::collections::HashMap::new();

        for (rank, id) in semantic_ids.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (K + rank as f32 + 1.0);
        }
        for (rank, id) in fts_ids.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (K + rank as f32 + 1.0);
        }

        let mut sorted: Vec<(String, f32)> =
            scores.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        sorted.truncate(limit);
        sorted
    }

    /// Aggregate store statistics (`reqragctl stats`).
    pub fn stats(&self) -> Result<IndexStats, StoreError> {
        self.rt.block_on(async {
            let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
                .fetch_one(&self.pool)
                .await?;
            let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
            let schema_version: i32 = sqlx::query_scalar(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
            )
            .fetch_optional(&self.pool)
            .await?
            .and_then(|v: String| v.parse().ok())
            .unwrap_or(0);
            let model_name: Option<String> =
                sqlx::query_scalar("SELECT value FROM metadata WHERE key = 'model_name'")
                    .fetch_optional(&self.pool)
                    .await?;
            let dimensions: Option<u32> =
                sqlx::query_scalar("SELECT value FROM metadata WHERE key = 'dimensions'")
                    .fetch_optional(&self.pool)
                    .await?
                    .and_then(|v: String| v.parse().ok());
            let created_at: Option<String> =
                sqlx::query_scalar("SELECT value FROM metadata WHERE key = 'created_at'")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(IndexStats {
                total_records,
                total_chunks,
                schema_version,
                model_name,
                dimensions,
                created_at,
            })
        })
    }

    /// Gracefully close, checkpointing the WAL into the main database file.
    pub fn close(self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.rt.block_on(async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&self.pool)
                .await?;
            self.pool.close().await;
            Ok(())
        })
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if let Err(e) = self
                .rt
                .block_on(async { sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.pool).await })
            {
                tracing::debug!(error = %e, "WAL checkpoint on drop failed (non-fatal)");
            }
        }));
    }
}
