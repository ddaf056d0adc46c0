//! Configuration document (§6 EXTERNAL INTERFACES — "Configuration").
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. A built-in Hebrew-language default, embedded via `include_str!`.
//! 2. `~/.config/reqrag/config.toml` (user defaults).
//! 3. `.reqrag.toml` in the project root (project overrides).
//!
//! This is the same three-layer precedence the teacher's own config loader
//! uses for CLI defaults, generalized from a handful of scalar overrides to
//! the full field-tier / parser-pattern / threshold document this spec
//! requires to be "hot-swappable without recompiling the parser" (§9).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CONFIG: &str = include_str!("default_config.toml");

/// One of the four weight tiers a record field can be assigned to (§4A).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTier {
    Critical,
    Important,
    Supporting,
    Auxiliary,
}

impl FieldTier {
    /// Integer repeat weight: `critical` appears 3x, `important` 2x,
    /// `supporting` 1x, `auxiliary` renders once but is itself half-weighted
    /// against a `supporting` field in downstream boosting heuristics — the
    /// serializer still emits it once since a token can't repeat 0.5 times.
    pub fn repeat_count(self) -> usize {
        match self {
            FieldTier::Critical => 3,
            FieldTier::Important => 2,
            FieldTier::Supporting => 1,
            FieldTier::Auxiliary => 1,
        }
    }

    pub fn weight(self) -> f32 {
        match self {
            FieldTier::Critical => 3.0,
            FieldTier::Important => 2.0,
            FieldTier::Supporting => 1.0,
            FieldTier::Auxiliary => 0.5,
        }
    }
}

/// A single configured field: its canonical name, display label, and tier.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub tier: FieldTier,
}

/// Per-intent cue-phrase / stop-token / entity-extraction configuration (§4D).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentPatterns {
    /// Phrases that, when matched as a prefix/anchor, indicate this intent.
    #[serde(default)]
    pub cue_phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// intent name -> cue phrases
    #[serde(default)]
    pub intents: HashMap<String, IntentPatterns>,
    /// Tokens that bound a captured name (structural cue words, date markers,
    /// logical-operator tokens).
    #[serde(default)]
    pub stop_tokens: Vec<String>,
    /// Single characters that mark a grammatical relation ("from X") and may
    /// be stripped from the front of a captured name.
    #[serde(default)]
    pub relation_markers: Vec<char>,
    /// Cue phrases that anchor a `person_name` capture (e.g. "מאת", "על ידי").
    #[serde(default)]
    pub person_cues: Vec<String>,
    /// Cue phrases that anchor a `project_name` capture.
    #[serde(default)]
    pub project_cues: Vec<String>,
    /// Cue phrases that anchor a `type_id` capture.
    #[serde(default)]
    pub type_cues: Vec<String>,
    /// Cue phrases that anchor a `status_id` capture.
    #[serde(default)]
    pub status_cues: Vec<String>,
    /// Cue phrases that anchor a `request_id` capture ("similar to <id>").
    #[serde(default)]
    pub similar_cues: Vec<String>,
    /// Query-type keyword lists.
    #[serde(default)]
    pub count_keywords: Vec<String>,
    #[serde(default)]
    pub summarize_keywords: Vec<String>,
    #[serde(default)]
    pub urgent_keywords: Vec<String>,
    #[serde(default)]
    pub answer_retrieval_keywords: Vec<String>,
    /// Explicit disjunction / conjunction markers (whitespace-bounded tokens).
    #[serde(default)]
    pub or_markers: Vec<String>,
    #[serde(default)]
    pub and_markers: Vec<String>,
}

/// Retrieval thresholds and defaults (§4E, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k_default: usize,
    #[serde(default = "default_k_summary")]
    pub k_summary: usize,
    #[serde(default = "default_min_records")]
    pub min_records_for_strict: usize,
    #[serde(default = "default_strict_threshold")]
    pub threshold_strict: f32,
    #[serde(default = "default_general_threshold")]
    pub threshold_general: f32,
    #[serde(default = "default_mixed_threshold")]
    pub threshold_mixed: f32,
    #[serde(default = "default_similar_floor")]
    pub similar_floor: f32,
    #[serde(default = "default_boost_target")]
    pub boost_target_field: f32,
    #[serde(default = "default_boost_anywhere")]
    pub boost_anywhere: f32,
    #[serde(default = "default_boost_none")]
    pub boost_none: f32,
}

fn default_k() -> usize {
    20
}
fn default_k_summary() -> usize {
    100
}
fn default_min_records() -> usize {
    3
}
fn default_strict_threshold() -> f32 {
    0.5
}
fn default_general_threshold() -> f32 {
    0.4
}
fn default_mixed_threshold() -> f32 {
    0.2
}
fn default_similar_floor() -> f32 {
    0.6
}
fn default_boost_target() -> f32 {
    2.0
}
fn default_boost_anywhere() -> f32 {
    1.5
}
fn default_boost_none() -> f32 {
    1.0
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_default: default_k(),
            k_summary: default_k_summary(),
            min_records_for_strict: default_min_records(),
            threshold_strict: default_strict_threshold(),
            threshold_general: default_general_threshold(),
            threshold_mixed: default_mixed_threshold(),
            similar_floor: default_similar_floor(),
            boost_target_field: default_boost_target(),
            boost_anywhere: default_boost_anywhere(),
            boost_none: default_boost_none(),
        }
    }
}

/// Model settings: embedding + generation model names, dimension, quantization.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default)]
    pub quantization: Option<String>,
}

fn default_embedding_model() -> String {
    "intfloat/multilingual-e5-base".to_string()
}
fn default_dimensions() -> u32 {
    768
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            generation_model: default_generation_model(),
            quantization: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub field_truncate_len: Option<usize>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    pub parser: Option<ParserConfig>,
    pub retrieval: Option<RetrievalConfig>,
    pub model: Option<ModelConfig>,
}

impl Config {
    pub const DEFAULT_CHUNK_SIZE: usize = 512;
    pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
    pub const DEFAULT_FIELD_TRUNCATE_LEN: usize = 120;

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(Self::DEFAULT_CHUNK_SIZE)
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(Self::DEFAULT_CHUNK_OVERLAP)
    }

    pub fn field_truncate_len(&self) -> usize {
        self.field_truncate_len
            .unwrap_or(Self::DEFAULT_FIELD_TRUNCATE_LEN)
    }

    /// Effective retrieval settings, falling back to defaults when no layer
    /// (built-in, user, or project) set a `[retrieval]` section.
    pub fn retrieval(&self) -> RetrievalConfig {
        self.retrieval.clone().unwrap_or_default()
    }

    /// Effective model settings, falling back to defaults when no layer set
    /// a `[model]` section.
    pub fn model(&self) -> ModelConfig {
        self.model.clone().unwrap_or_default()
    }

    /// Load the built-in default, layered with a user config and a project
    /// config if present. Mirrors the teacher's `Config::load`.
    pub fn load(project_root: &Path) -> Self {
        let builtin = Self::parse(BUILTIN_CONFIG).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Built-in default config failed to parse");
            Config::default()
        });

        let user = dirs::config_dir()
            .map(|d| d.join("reqrag/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project = Self::load_file(&project_root.join(".reqrag.toml")).unwrap_or_default();

        let merged = builtin.override_with(user).override_with(project);
        tracing::debug!(
            fields = merged.fields.len(),
            chunk_size = merged.chunk_size(),
            "Effective config after merge"
        );
        merged
    }

    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };
        Self::parse(&content)
            .map_err(|e| tracing::warn!("Failed to parse config {}: {}", path.display(), e))
            .ok()
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The built-in default, unmerged with any user/project layer. Used by
    /// other modules' tests that need a realistic `ParserConfig`/field list
    /// without touching the filesystem.
    pub fn default_built_in() -> Self {
        Self::parse(BUILTIN_CONFIG).expect("built-in config must parse")
    }

    /// Layer another config on top (other overrides self where present).
    /// Vec/Map-shaped sections replace wholesale rather than merge field-by-
    /// field, since a project overriding `[[fields]]` almost always means to
    /// supply the complete list for its deployment, not patch the default's.
    /// `retrieval`/`model`/`parser` are `Option`-merged the same way: an
    /// omitted section in `other` (no `[retrieval]`/`[model]` table at all)
    /// must not reset an already-layered-in value from an earlier layer
    /// (§6 three-layer precedence) — only a section actually present in
    /// `other` overrides.
    fn override_with(self, other: Self) -> Self {
        Config {
            chunk_size: other.chunk_size.or(self.chunk_size),
            chunk_overlap: other.chunk_overlap.or(self.chunk_overlap),
            field_truncate_len: other.field_truncate_len.or(self.field_truncate_len),
            fields: if other.fields.is_empty() {
                self.fields
            } else {
                other.fields
            },
            parser: other.parser.or(self.parser),
            retrieval: other.retrieval.or(self.retrieval),
            model: other.model.or(self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let cfg = Config::parse(BUILTIN_CONFIG).expect("built-in config must parse");
        assert!(!cfg.fields.is_empty());
        assert!(cfg.parser.is_some());
    }

    #[test]
    fn tier_weights_match_spec() {
        assert_eq!(FieldTier::Critical.repeat_count(), 3);
        assert_eq!(FieldTier::Important.repeat_count(), 2);
        assert_eq!(FieldTier::Supporting.repeat_count(), 1);
    }

    #[test]
    fn override_replaces_scalars_and_fields_wholesale() {
        let base = Config {
            chunk_size: Some(512),
            fields: vec![FieldSpec {
                name: "a".into(),
                label: "A".into(),
                tier: FieldTier::Critical,
            }],
            ..Default::default()
        };
        let project = Config {
            chunk_size: Some(256),
            ..Default::default()
        };
        let merged = base.override_with(project);
        assert_eq!(merged.chunk_size, Some(256));
        assert_eq!(merged.fields.len(), 1); // project had none, so base kept
    }

    #[test]
    fn override_with_an_absent_retrieval_or_model_section_keeps_the_earlier_layer() {
        let user = Config {
            retrieval: Some(RetrievalConfig {
                threshold_strict: 0.9,
                ..RetrievalConfig::default()
            }),
            model: Some(ModelConfig {
                embedding_model: "user/embedding-model".into(),
                ..ModelConfig::default()
            }),
            ..Default::default()
        };
        // Simulates an empty project `.reqrag.toml` (no `[retrieval]`/`[model]` table).
        let project = Config::default();

        let merged = user.override_with(project);
        assert_eq!(merged.retrieval().threshold_strict, 0.9);
        assert_eq!(merged.model().embedding_model, "user/embedding-model");
    }

    #[test]
    fn override_with_a_present_retrieval_or_model_section_replaces_the_earlier_layer() {
        let user = Config {
            retrieval: Some(RetrievalConfig {
                threshold_strict: 0.9,
                ..RetrievalConfig::default()
            }),
            ..Default::default()
        };
        let project = Config {
            retrieval: Some(RetrievalConfig {
                threshold_strict: 0.1,
                ..RetrievalConfig::default()
            }),
            ..Default::default()
        };

        let merged = user.override_with(project);
        assert_eq!(merged.retrieval().threshold_strict, 0.1);
    }
}
