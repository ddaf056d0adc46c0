//! Approximate nearest-neighbor acceleration via HNSW (§4C "the store MAY
//! maintain an in-memory ANN index as an accelerator; brute-force cosine
//! scan over SQL-filtered rows remains the ground truth").
//!
//! Grounded on the teacher's `hnsw.rs`: same `hnsw_rs`-backed graph, blake3
//! checksum verification on load (mitigating `RUSTSEC-2025-0141`, the
//! crate's unmaintained bincode dependency), and the `LoadedHnsw`
//! self-referential wrapper for the borrowed-from-`HnswIo` load path.
//! Generalized from a fixed 769-dim (768 model + 1 sentiment) code-chunk
//! layout to this deployment's configured embedding dimension, carried as a
//! field rather than a compile-time constant.

use std::mem::ManuallyDrop;
use std::path::Path;

use hnsw_rs::anndists::dist::distances::DistCosine;
use hnsw_rs::api::AnnT;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::hnswio::HnswIo;
use thiserror::Error;

use crate::embedder::Embedding;
use crate::index::{IndexResult, VectorIndex};

const MAX_NB_CONNECTION: usize = 24;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 100;

#[derive(Error, Debug)]
pub enum AnnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ANN index not found at {0}")]
    NotFound(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("ANN index error: {0}")]
    Internal(String),
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}; index may be corrupted")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone)]
pub struct AnnResult {
    pub record_id: String,
    pub score: f32,
}

const ANN_EXTENSIONS: &[&str] = &["hnsw.graph", "hnsw.data", "hnsw.ids"];

fn verify_checksums(dir: &Path, basename: &str) -> Result<(), AnnError> {
    let checksum_path = dir.join(format!("{}.hnsw.checksum", basename));
    if !checksum_path.exists() {
        tracing::warn!("no checksum file for ANN index, run `reqragctl index --force` to add one");
        return Ok(());
    }

    let checksum_content = std::fs::read_to_string(&checksum_path)?;
    for line in checksum_content.lines() {
        let Some((ext, expected)) = line.split_once(':') else {
            continue;
        };
        if !ANN_EXTENSIONS.contains(&ext) {
            tracing::warn!(extension = %ext, "ignoring unknown extension in ANN checksum file");
            continue;
        }
        let path = dir.join(format!("{}.{}", basename, ext));
        if path.exists() {
            let data = std::fs::read(&path)?;
            let actual = blake3::hash(&data).to_hex().to_string();
            if actual != expected {
                return Err(AnnError::ChecksumMismatch {
                    file: path.display().to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
    }
    Ok(())
}

struct LoadedHnsw {
    io_ptr: *mut HnswIo,
    hnsw: ManuallyDrop<Hnsw<'static, f32, DistCosine>>,
}

impl Drop for LoadedHnsw {
    fn drop(&mut self) {
        // SAFETY: drop order is controlled — Hnsw first, then the HnswIo
        // buffers it borrows from, freed only after.
        unsafe {
            ManuallyDrop::drop(&mut self.hnsw);
            drop(Box::from_raw(self.io_ptr));
        }
    }
}

// SAFETY: io_ptr only ever points at file-backed buffers HnswIo owns; all
// external access to AnnIndex is synchronized by its owner (the Store).
unsafe impl Send for LoadedHnsw {}
unsafe impl Sync for LoadedHnsw {}

enum AnnInner {
    Owned(Hnsw<'static, f32, DistCosine>),
    Loaded(LoadedHnsw),
}

/// In-memory HNSW accelerator over record-level embeddings, keyed by
/// `record_id` (one vector per record — typically its first/primary
/// chunk — rather than per-chunk, since the Retriever already rolls chunk
/// matches up to records; §4C "MAY maintain").
pub struct AnnIndex {
    inner: AnnInner,
    id_map: Vec<String>,
    dimensions: usize,
}

impl AnnIndex {
    pub fn build(dimensions: usize, embeddings: Vec<(String, Embedding)>) -> Result<Self, AnnError> {
        if embeddings.is_empty() {
            let hnsw = Hnsw::new(MAX_NB_CONNECTION, 1, MAX_LAYER, EF_CONSTRUCTION, DistCosine);
            return Ok(Self {
                inner: AnnInner::Owned(hnsw),
                id_map: Vec::new(),
                dimensions,
            });
        }

        for (id, emb) in &embeddings {
            if emb.len() != dimensions {
                return Err(AnnError::DimensionMismatch {
                    expected: dimensions,
                    actual: emb.len(),
                });
            }
            tracing::trace!(record_id = %id, "adding record to ANN index");
        }

        let nb_elem = embeddings.len();
        let mut hnsw = Hnsw::new(MAX_NB_CONNECTION, nb_elem, MAX_LAYER, EF_CONSTRUCTION, DistCosine);

        let mut id_map = Vec::with_capacity(nb_elem);
        let vectors: Vec<Vec<f32>> = embeddings
            .iter()
            .map(|(id, emb)| {
                id_map.push(id.clone());
                emb.as_slice().to_vec()
            })
            .collect();
        let data_for_insert: Vec<(&Vec<f32>, usize)> = vectors.iter().zip(0..nb_elem).collect();
        hnsw.parallel_insert_data(&data_for_insert);

        tracing::info!(count = nb_elem, "ANN index built");

        Ok(Self {
            inner: AnnInner::Owned(hnsw),
            id_map,
            dimensions,
        })
    }

    pub fn search(&self, query: &Embedding, k: usize) -> Vec<AnnResult> {
        if self.id_map.is_empty() {
            return Vec::new();
        }
        if query.len() != self.dimensions {
            tracing::warn!(expected = self.dimensions, actual = query.len(), "ANN query dimension mismatch");
            return Vec::new();
        }

        let neighbors = match &self.inner {
            AnnInner::Owned(hnsw) => hnsw.search_neighbours(query.as_slice(), k, EF_SEARCH),
            AnnInner::Loaded(loaded) => loaded.hnsw.search_neighbours(query.as_slice(), k, EF_SEARCH),
        };

        neighbors
            .into_iter()
            .filter_map(|n| {
                let idx = n.d_id;
                if idx < self.id_map.len() {
                    Some(AnnResult {
                        record_id: self.id_map[idx].clone(),
                        score: 1.0 - n.distance,
                    })
                } else {
                    tracing::warn!(idx, "out-of-range index in ANN result");
                    None
                }
            })
            .collect()
    }

    pub fn save(&self, dir: &Path, basename: &str) -> Result<(), AnnError> {
        std::fs::create_dir_all(dir)?;
        match &self.inner {
            AnnInner::Owned(hnsw) => hnsw
                .file_dump(dir, basename)
                .map_err(|e| AnnError::Internal(format!("failed to dump ANN index: {}", e)))?,
            AnnInner::Loaded(loaded) => loaded
                .hnsw
                .file_dump(dir, basename)
                .map_err(|e| AnnError::Internal(format!("failed to dump ANN index: {}", e)))?,
        };

        let id_map_path = dir.join(format!("{}.hnsw.ids", basename));
        let id_map_json = serde_json::to_string(&self.id_map)
            .map_err(|e| AnnError::Internal(format!("failed to serialize id map: {}", e)))?;
        std::fs::write(&id_map_path, &id_map_json)?;

        let mut checksums = Vec::new();
        for ext in ANN_EXTENSIONS {
            let path = dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                let data = std::fs::read(&path)?;
                checksums.push(format!("{}:{}", ext, blake3::hash(&data).to_hex()));
            }
        }
        std::fs::write(dir.join(format!("{}.hnsw.checksum", basename)), checksums.join("\n"))?;

        tracing::info!(count = self.id_map.len(), "ANN index saved");
        Ok(())
    }

    pub fn load(dir: &Path, basename: &str, dimensions: usize) -> Result<Self, AnnError> {
        let graph_path = dir.join(format!("{}.hnsw.graph", basename));
        let data_path = dir.join(format!("{}.hnsw.data", basename));
        let id_map_path = dir.join(format!("{}.hnsw.ids", basename));

        if !graph_path.exists() || !data_path.exists() || !id_map_path.exists() {
            return Err(AnnError::NotFound(dir.display().to_string()));
        }

        verify_checksums(dir, basename)?;

        let id_map_json = std::fs::read_to_string(&id_map_path)?;
        let id_map: Vec<String> = serde_json::from_str(&id_map_json)
            .map_err(|e| AnnError::Internal(format!("failed to parse id map: {}", e)))?;

        let hnsw_io = Box::new(HnswIo::new(dir, basename));
        let io_ptr = Box::into_raw(hnsw_io);

        // SAFETY: io_ptr was just created from Box::into_raw above.
        let hnsw: Hnsw<'_, f32, DistCosine> = unsafe { &mut *io_ptr }.load_hnsw().map_err(|e| {
            // SAFETY: reclaiming the box we just leaked, on the error path only.
            unsafe {
                drop(Box::from_raw(io_ptr));
            }
            AnnError::Internal(format!("failed to load ANN index: {}", e))
        })?;

        // SAFETY: hnsw borrows from *io_ptr; LoadedHnsw's Drop order (hnsw,
        // then io_ptr) guarantees the borrow never outlives its data.
        let hnsw: Hnsw<'static, f32, DistCosine> = unsafe { std::mem::transmute(hnsw) };

        let loaded = LoadedHnsw {
            io_ptr,
            hnsw: ManuallyDrop::new(hnsw),
        };

        tracing::info!(count = id_map.len(), "ANN index loaded");

        Ok(Self {
            inner: AnnInner::Loaded(loaded),
            id_map,
            dimensions,
        })
    }

    pub fn exists(dir: &Path, basename: &str) -> bool {
        ["hnsw.graph", "hnsw.data", "hnsw.ids"]
            .iter()
            .all(|ext| dir.join(format!("{}.{}", basename, ext)).exists())
    }

    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }
}

impl VectorIndex for AnnIndex {
    fn search(&self, query: &Embedding, k: usize) -> Vec<IndexResult> {
        self.search(query, k)
            .into_iter()
            .map(|r| IndexResult {
                id: r.record_id,
                score: r.score,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn name(&self) -> &'static str {
        "hnsw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn make_embedding(seed: u32) -> Embedding {
        let mut v = vec![0.0f32; DIM];
        for (i, val) in v.iter_mut().enumerate() {
            *val = ((seed as f32 * 0.1) + (i as f32 * 0.01)).sin();
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut v {
                *val /= norm;
            }
        }
        Embedding::new(v)
    }

    #[test]
    fn build_and_search_finds_self() {
        let embeddings = vec![
            ("R1".to_string(), make_embedding(1)),
            ("R2".to_string(), make_embedding(2)),
            ("R3".to_string(), make_embedding(3)),
        ];
        let index = AnnIndex::build(DIM, embeddings).unwrap();
        assert_eq!(index.len(), 3);

        let query = make_embedding(1);
        let results = index.search(&query, 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].record_id, "R1");
        assert!(results[0].score > 0.9);
    }

    #[test]
    fn save_and_load_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let embeddings = vec![
            ("R1".to_string(), make_embedding(1)),
            ("R2".to_string(), make_embedding(2)),
        ];
        let index = AnnIndex::build(DIM, embeddings).unwrap();
        index.save(tmp.path(), "index").unwrap();
        assert!(AnnIndex::exists(tmp.path(), "index"));

        let loaded = AnnIndex::load(tmp.path(), "index", DIM).unwrap();
        assert_eq!(loaded.len(), 2);
        let results = loaded.search(&make_embedding(1), 2);
        assert_eq!(results[0].record_id, "R1");
    }

    #[test]
    fn empty_index_search_returns_empty() {
        let index = AnnIndex::build(DIM, vec![]).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&make_embedding(1), 5).is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected_at_build() {
        let embeddings = vec![("R1".to_string(), Embedding::new(vec![0.0; DIM + 1]))];
        let err = AnnIndex::build(DIM, embeddings).unwrap_err();
        assert!(matches!(err, AnnError::DimensionMismatch { .. }));
    }
}
