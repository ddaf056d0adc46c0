//! Embedding Oracle (§4B) — `embed`/`embed_batch` via ort + tokenizers + hf-hub.
//!
//! Directly generalizes the teacher's embedder: same lazy-`OnceCell`-guarded
//! ONNX session, LRU query cache, and CUDA/TensorRT/CPU execution-provider
//! auto-detection, retargeted from a fixed 768+1(sentiment)-dim code model to
//! a configurable multilingual/Hebrew-capable sentence-embedding model with
//! no reserved sentiment dimension (that was a code-search-specific
//! extension with no counterpart in the spec).

use lru::LruCache;
use ndarray::Array2;
use once_cell::sync::OnceCell;
use ort::ep::ExecutionProvider as OrtExecutionProvider;
use ort::session::Session;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("tokenizer error: {0}")]
    TokenizerError(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("HuggingFace Hub error: {0}")]
    HfHubError(String),
    #[error(
        "dimension mismatch: model produced {actual}-dim embeddings, deployment expects {expected}"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<ort::Error> for EmbedderError {
    fn from(e: ort::Error) -> Self {
        EmbedderError::InferenceFailed(e.to_string())
    }
}

/// An L2-normalized embedding vector of the deployment's configured dimension.
#[derive(Debug, Clone)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(data: Vec<f32>) -> Self {
        Self(data)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Hardware execution provider for inference (§4G reuses this to pick a
/// decoding profile without re-probing hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    CUDA { device_id: i32 },
    TensorRT { device_id: i32 },
    CPU,
}

impl ExecutionProvider {
    pub fn is_gpu(self) -> bool {
        !matches!(self, ExecutionProvider::CPU)
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionProvider::CUDA { device_id } => write!(f, "CUDA (device {})", device_id),
            ExecutionProvider::TensorRT { device_id } => {
                write!(f, "TensorRT (device {})", device_id)
            }
            ExecutionProvider::CPU => write!(f, "CPU"),
        }
    }
}

/// Model coordinates resolved from configuration (§6 "model names ... dimension").
pub struct ModelSpec {
    pub repo: String,
    pub model_file: String,
    pub tokenizer_file: String,
    pub dimensions: usize,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            repo: "intfloat/multilingual-e5-base".to_string(),
            model_file: "onnx/model.onnx".to_string(),
            tokenizer_file: "onnx/tokenizer.json".to_string(),
            dimensions: 768,
        }
    }
}

/// Text embedding generator. Automatically downloads the model from
/// HuggingFace Hub on first use; detects GPU availability and uses
/// CUDA/TensorRT when available, falling back to CPU.
pub struct Embedder {
    session: OnceCell<Mutex<Session>>,
    tokenizer: OnceCell<tokenizers::Tokenizer>,
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    dimensions: usize,
    provider: ExecutionProvider,
    max_length: usize,
    query_cache: Mutex<LruCache<String, Embedding>>,
}

impl Embedder {
    /// Create a new embedder for the given model spec, downloading the
    /// model if necessary. Detects GPU and uses CUDA/TensorRT when
    /// available; the ONNX session itself is lazily created on first call.
    pub fn new(spec: &ModelSpec) -> Result<Self, EmbedderError> {
        let (model_path, tokenizer_path) = ensure_model(spec)?;
        let provider = select_provider();
        Self::with_paths(model_path, tokenizer_path, spec.dimensions, provider)
    }

    pub fn new_cpu(spec: &ModelSpec) -> Result<Self, EmbedderError> {
        let (model_path, tokenizer_path) = ensure_model(spec)?;
        Self::with_paths(
            model_path,
            tokenizer_path,
            spec.dimensions,
            ExecutionProvider::CPU,
        )
    }

    fn with_paths(
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        dimensions: usize,
        provider: ExecutionProvider,
    ) -> Result<Self, EmbedderError> {
        let query_cache = Mutex::new(LruCache::new(
            NonZeroUsize::new(100).expect("100 is non-zero"),
        ));
        Ok(Self {
            session: OnceCell::new(),
            tokenizer: OnceCell::new(),
            model_path,
            tokenizer_path,
            dimensions,
            provider,
            max_length: 512,
            query_cache,
        })
    }

    fn session(&self) -> Result<std::sync::MutexGuard<'_, Session>, EmbedderError> {
        let session = self
            .session
            .get_or_try_init(|| create_session(&self.model_path, self.provider).map(Mutex::new))?;
        Ok(session.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn tokenizer(&self) -> Result<&tokenizers::Tokenizer, EmbedderError> {
        self.tokenizer.get_or_try_init(|| {
            tokenizers::Tokenizer::from_file(&self.tokenizer_path)
                .map_err(|e| EmbedderError::TokenizerError(e.to_string()))
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }

    /// Embed record-chunk text (document side). E5-family models expect a
    /// `"passage: "` prefix; kept since the default model is E5-family.
    pub fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("passage: {}", t)).collect();
        self.embed_batch(&prefixed)
    }

    /// Embed a query (§4B `embed`). Uses an LRU cache for repeated queries.
    pub fn embed_query(&self, text: &str) -> Result<Embedding, EmbedderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbedderError::EmptyQuery);
        }

        {
            let mut cache = self.query_cache.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(cached) = cache.get(text) {
                return Ok(cached.clone());
            }
        }

        let prefixed = format!("query: {}", text);
        let results = self.embed_batch(&[prefixed])?;
        let embedding = results
            .into_iter()
            .next()
            .expect("embed_batch with single item always returns one result");

        {
            let mut cache = self.query_cache.lock().unwrap_or_else(|p| p.into_inner());
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    /// Embed a batch of texts (§4B `embed_batch`). Both `embed_documents`
    /// and `embed_query` delegate here.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        use ort::value::Tensor;

        let _span = tracing::info_span!("embed_batch", count = texts.len()).entered();

        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer()?
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        let input_ids: Vec<Vec<i64>> = encodings
            .iter()
            .map(|e| e.get_ids().iter().map(|&id| id as i64).collect())
            .collect();
        let attention_mask: Vec<Vec<i64>> = encodings
            .iter()
            .map(|e| e.get_attention_mask().iter().map(|&m| m as i64).collect())
            .collect();

        let max_len = input_ids
            .iter()
            .map(|v| v.len())
            .max()
            .unwrap_or(0)
            .min(self.max_length);

        let input_ids_arr = pad_2d_i64(&input_ids, max_len, 0);
        let attention_mask_arr = pad_2d_i64(&attention_mask, max_len, 0);
        let token_type_ids_arr = Array2::<i64>::zeros((texts.len(), max_len));

        let input_ids_tensor = Tensor::from_array(input_ids_arr)?;
        let attention_mask_tensor = Tensor::from_array(attention_mask_arr)?;
        let token_type_ids_tensor = Tensor::from_array(token_type_ids_arr)?;

        let mut session = self.session()?;
        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        ])?;

        let (_shape, data) = outputs["last_hidden_state"].try_extract_tensor::<f32>()?;

        let batch_size = texts.len();
        let seq_len = max_len;
        let embedding_dim = self.dimensions;
        let mut results = Vec::with_capacity(batch_size);

        for (i, mask_vec) in attention_mask.iter().enumerate().take(batch_size) {
            let mut sum = vec![0.0f32; embedding_dim];
            let mut count = 0.0f32;

            for j in 0..seq_len {
                let mask = mask_vec.get(j).copied().unwrap_or(0) as f32;
                if mask > 0.0 {
                    count += mask;
                    let offset = i * seq_len * embedding_dim + j * embedding_dim;
                    for (k, sum_val) in sum.iter_mut().enumerate() {
                        *sum_val += data[offset + k] * mask;
                    }
                }
            }

            if count > 0.0 {
                for sum_val in &mut sum {
                    *sum_val /= count;
                }
            }

            results.push(Embedding::new(normalize_l2(sum)));
        }

        Ok(results)
    }

    pub fn warm(&self) -> Result<(), EmbedderError> {
        let _ = self.embed_query("warmup")?;
        Ok(())
    }
}

fn ensure_model(spec: &ModelSpec) -> Result<(PathBuf, PathBuf), EmbedderError> {
    use hf_hub::api::sync::Api;

    let api = Api::new().map_err(|e| EmbedderError::HfHubError(e.to_string()))?;
    let repo = api.model(spec.repo.clone());

    let model_path = repo
        .get(&spec.model_file)
        .map_err(|e| EmbedderError::HfHubError(e.to_string()))?;
    let tokenizer_path = repo
        .get(&spec.tokenizer_file)
        .map_err(|e| EmbedderError::HfHubError(e.to_string()))?;

    Ok((model_path, tokenizer_path))
}

/// Ensure ort CUDA/TensorRT provider libraries are findable.
///
/// The ort crate downloads provider libs to ~/.cache/ort.pyke.io/... but
/// doesn't add them to the library search path; this creates symlinks in a
/// directory that's already in LD_LIBRARY_PATH.
fn ensure_ort_provider_libs() {
    let home = match std::env::var("HOME") {
        Ok(h) => std::path::PathBuf::from(h),
        Err(_) => return,
    };
    let ort_cache = home.join(".cache/ort.pyke.io/dfbin/x86_64-unknown-linux-gnu");

    let ort_lib_dir = match std::fs::read_dir(&ort_cache) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.path())
            .next(),
        Err(_) => return,
    };
    let Some(ort_lib_dir) = ort_lib_dir else {
        return;
    };

    let ld_path = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
    let ort_cache_str = ort_cache.to_string_lossy();
    let target_dir = ld_path
        .split(':')
        .find(|p| {
            !p.is_empty() && std::path::Path::new(p).is_dir() && !p.contains(ort_cache_str.as_ref())
        })
        .map(std::path::PathBuf::from);
    let Some(target_dir) = target_dir else {
        return;
    };

    let provider_libs = [
        "libonnxruntime_providers_shared.so",
        "libonnxruntime_providers_cuda.so",
        "libonnxruntime_providers_tensorrt.so",
    ];

    for lib in &provider_libs {
        let src = ort_lib_dir.join(lib);
        let dst = target_dir.join(lib);
        if !src.exists() {
            continue;
        }
        if dst.symlink_metadata().is_ok() {
            if let Ok(target) = std::fs::read_link(&dst) {
                if target == src {
                    continue;
                }
            }
            let _ = std::fs::remove_file(&dst);
        }
        if let Err(e) = std::os::unix::fs::symlink(&src, &dst) {
            tracing::debug!("failed to symlink {}: {}", lib, e);
        } else {
            tracing::info!("created symlink: {} -> {}", dst.display(), src.display());
        }
    }
}

fn select_provider() -> ExecutionProvider {
    use ort::ep::{TensorRT, CUDA};

    ensure_ort_provider_libs();

    let cuda = CUDA::default();
    if cuda.is_available().unwrap_or(false) {
        return ExecutionProvider::CUDA { device_id: 0 };
    }
    let tensorrt = TensorRT::default();
    if tensorrt.is_available().unwrap_or(false) {
        return ExecutionProvider::TensorRT { device_id: 0 };
    }
    ExecutionProvider::CPU
}

fn create_session(model_path: &Path, provider: ExecutionProvider) -> Result<Session, EmbedderError> {
    use ort::ep::{TensorRT, CUDA};

    let builder = Session::builder()?;
    let session = match provider {
        ExecutionProvider::CUDA { device_id } => builder
            .with_execution_providers([CUDA::default().with_device_id(device_id).build()])?
            .commit_from_file(model_path)?,
        ExecutionProvider::TensorRT { device_id } => builder
            .with_execution_providers([
                TensorRT::default().with_device_id(device_id).build(),
                CUDA::default().with_device_id(device_id).build(),
            ])?
            .commit_from_file(model_path)?,
        ExecutionProvider::CPU => builder.commit_from_file(model_path)?,
    };
    Ok(session)
}

fn pad_2d_i64(inputs: &[Vec<i64>], max_len: usize, pad_value: i64) -> Array2<i64> {
    let batch_size = inputs.len();
    let mut arr = Array2::from_elem((batch_size, max_len), pad_value);
    for (i, seq) in inputs.iter().enumerate() {
        for (j, &val) in seq.iter().take(max_len).enumerate() {
            arr[[i, j]] = val;
        }
    }
    arr
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm_sq: f32 = v.iter().fold(0.0, |acc, &x| acc + x * x);
    if norm_sq > 0.0 {
        let inv_norm = 1.0 / norm_sq.sqrt();
        v.iter_mut().for_each(|x| *x *= inv_norm);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_l2_produces_unit_vector() {
        let v = normalize_l2(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalize_l2_handles_zero_vector() {
        let v = normalize_l2(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn pad_2d_pads_shorter_sequences() {
        let arr = pad_2d_i64(&[vec![1, 2], vec![1]], 3, 0);
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr[[1, 1]], 0);
        assert_eq!(arr[[1, 2]], 0);
    }

    #[test]
    fn execution_provider_is_gpu() {
        assert!(!ExecutionProvider::CPU.is_gpu());
        assert!(ExecutionProvider::CUDA { device_id: 0 }.is_gpu());
    }
}
