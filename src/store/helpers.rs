//! Store helper types, errors, and embedding (de)serialization.
//!
//! Grounded on the teacher's `store/helpers.rs`: same `ChunkRow`/`StoreError`
//! shape and the same `bytemuck`-based zero-copy embedding byte conversion,
//! generalized from a fixed 769-dim layout to a runtime-checked dimension
//! carried in `metadata` (§4C "dimension mismatch ... fatal").

use thiserror::Error;

/// Current database schema version. Bump when `schema.sql` changes shape.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("schema version mismatch: store is v{0}, engine expects v{1}")]
    SchemaMismatch(i32, i32),
    #[error("store created by newer engine version (schema v{0}); please upgrade")]
    SchemaNewerThanEngine(i32),
    #[error(
        "model mismatch: store uses '{0}', current deployment configured for '{1}'. Rebuild the index."
    )]
    ModelMismatch(String, String),
    #[error(
        "dimension mismatch: store has {0}-dim embeddings, current model produces {1}. Rebuild the index."
    )]
    DimensionMismatch(u32, u32),
    #[error("retrieval deadline exceeded")]
    TimedOut,
}

/// Raw chunk row as persisted (crate-internal; callers use [`ChunkMatch`]).
#[derive(Clone, Debug)]
pub(crate) struct ChunkRow {
    pub id: i64,
    pub record_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<u8>,
}

/// A chunk as returned from a ranking query, already decoded.
#[derive(Clone, Debug)]
pub struct ChunkMatch {
    pub record_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Raw cosine similarity against the query vector, before boosting.
    pub raw_similarity: f32,
}

/// Embedding model metadata persisted alongside the store (§6).
#[derive(Clone, Debug)]
pub struct ModelInfo {
    pub name: String,
    pub dimensions: u32,
}

/// Aggregate store statistics (`reqrag stats`).
#[derive(Clone, Debug, Default)]
pub struct IndexStats {
    pub total_records: i64,
    pub total_chunks: i64,
    pub schema_version: i32,
    pub model_name: Option<String>,
    pub dimensions: Option<u32>,
    pub created_at: Option<String>,
}

// ============ Embedding Serialization ============
// Embeddings are stored little-endian as raw f32 bytes via bytemuck, same
// zero-copy convention the teacher uses for its own embedding BLOB column.

pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Returns `None` (rather than panicking) if the byte length isn't a whole
/// number of f32s — a corrupted or truncated BLOB should be skippable by
/// the hot retrieval path, not a panic.
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        tracing::trace!(len = bytes.len(), "embedding byte length not a multiple of 4, skipping");
        return None;
    }
    Some(bytemuck::cast_slice::<u8, f32>(bytes).to_vec())
}
