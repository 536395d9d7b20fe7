//! Configuration types for matching, similarity, and ensemble extraction.
//!
//! Every struct deserializes with `#[serde(default)]`, so a partial JSON
//! document only overrides what it names. Durations are milliseconds.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ExtractionError, Result};
use crate::traits::embedder::{EmbedOptions, EmbeddingTask};
use crate::types::nugget::NuggetType;

/// Environment variable holding the path of a JSON config file.
pub const CONFIG_ENV_VAR: &str = "NUGGETS_CONFIG";

/// Configuration for the boundary matcher and reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Minimum window score for the fuzzy tier (0.0 to 1.0).
    ///
    /// Default: 0.75.
    pub fuzzy_tolerance: f32,

    /// Word similarities below this floor count as 0.
    ///
    /// Default: 0.6.
    pub fuzzy_word_floor: f32,

    /// Fraction of a fragment a single unchanged diff segment must cover.
    ///
    /// Default: 0.8.
    pub diff_min_coverage: f32,

    /// Sources longer than this (bytes) skip the character-level diff.
    pub diff_char_limit: usize,

    /// Deadline for each diff computation.
    pub diff_timeout_ms: u64,

    /// Bytes searched on either side of a span during refinement.
    ///
    /// Default: 50.
    pub refinement_window: usize,

    /// Reconstructed text must beat `start...end` by this many bytes to be
    /// preferred for display.
    pub min_display_gain: usize,

    /// Words taken from each end of a full passage to derive fragments.
    pub fragment_words: usize,

    /// Normalized sources memoized per matcher.
    pub position_cache_capacity: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            fuzzy_tolerance: 0.75,
            fuzzy_word_floor: 0.6,
            diff_min_coverage: 0.8,
            diff_char_limit: 20_000,
            diff_timeout_ms: 250,
            refinement_window: 50,
            min_display_gain: 10,
            fragment_words: 5,
            position_cache_capacity: 32,
        }
    }
}

impl BoundaryConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fuzzy tolerance.
    pub fn with_fuzzy_tolerance(mut self, tolerance: f32) -> Self {
        self.fuzzy_tolerance = tolerance.clamp(0.0, 1.0);
        self
    }

    /// Set the refinement window.
    pub fn with_refinement_window(mut self, window: usize) -> Self {
        self.refinement_window = window;
        self
    }

    /// Set the minimum display gain.
    pub fn with_min_display_gain(mut self, gain: usize) -> Self {
        self.min_display_gain = gain;
        self
    }
}

/// Options for grouping fragments across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityOptions {
    /// Try embeddings before lexical overlap.
    ///
    /// Default: true (only effective when an embedder is configured).
    pub use_embeddings: bool,

    /// Cosine similarity needed to join a group.
    ///
    /// Default: 0.75.
    pub embedding_threshold: f32,

    /// Word-set overlap needed to join a group on the lexical path.
    ///
    /// Default: 0.6.
    pub word_overlap_threshold: f32,

    /// Embedding task hint passed to the embedder.
    pub task_type: EmbeddingTask,

    /// Requested output dimensionality (None = embedder's native size).
    pub dimensions: Option<usize>,

    /// Maximum texts per embedding request.
    pub batch_size: usize,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            use_embeddings: true,
            embedding_threshold: 0.75,
            word_overlap_threshold: 0.6,
            task_type: EmbeddingTask::SemanticSimilarity,
            dimensions: None,
            batch_size: 100,
        }
    }
}

impl SimilarityOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lexical grouping only.
    pub fn lexical() -> Self {
        Self {
            use_embeddings: false,
            ..Default::default()
        }
    }

    /// Set the embedding threshold.
    pub fn with_embedding_threshold(mut self, threshold: f32) -> Self {
        self.embedding_threshold = threshold;
        self
    }

    /// Set the word-overlap threshold.
    pub fn with_word_overlap_threshold(mut self, threshold: f32) -> Self {
        self.word_overlap_threshold = threshold;
        self
    }

    /// Request a specific output dimensionality.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Embedder options derived from these settings.
    pub fn embed_options(&self) -> EmbedOptions {
        EmbedOptions {
            task_type: self.task_type,
            dimensions: self.dimensions,
        }
    }
}

/// Which provider operation an ensemble run calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// `ExtractionProvider::extract`
    #[default]
    Standard,

    /// `ExtractionProvider::extract_high_recall`
    HighRecall,
}

/// Options for ensemble extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleOptions {
    /// Independent provider calls (values below 1 are treated as 1).
    ///
    /// Default: 3.
    pub runs: usize,

    /// Sampling temperature passed to every run.
    pub temperature: f32,

    /// Provider operation to call.
    pub mode: ExtractionMode,

    /// Restrict extraction to these types (None = all).
    pub selected_types: Option<Vec<NuggetType>>,

    /// Grouping options.
    pub similarity: SimilarityOptions,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            runs: 3,
            temperature: 0.7,
            mode: ExtractionMode::Standard,
            selected_types: None,
            similarity: SimilarityOptions::default(),
        }
    }
}

impl EnsembleOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of runs.
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the extraction mode.
    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict to specific types.
    pub fn with_types(mut self, types: impl IntoIterator<Item = NuggetType>) -> Self {
        self.selected_types = Some(types.into_iter().collect());
        self
    }

    /// Set the similarity options.
    pub fn with_similarity(mut self, similarity: SimilarityOptions) -> Self {
        self.similarity = similarity;
        self
    }

    /// Runs actually issued.
    pub fn effective_runs(&self) -> usize {
        self.runs.max(1)
    }
}

/// Options for the two-phase pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPhaseOptions {
    /// Phase-1 nuggets below this confidence are dropped.
    ///
    /// Default: 0.85.
    pub confidence_threshold: f32,

    /// Fraction removed by the filter above which a quality warning is logged.
    ///
    /// Default: 0.6.
    pub quality_warning_ratio: f32,

    /// Temperature for the phase-1 call.
    pub temperature: f32,

    /// Run phase 1 through the consensus builder when set.
    pub ensemble: Option<EnsembleOptions>,

    /// Restrict extraction to these types (None = all).
    pub selected_types: Option<Vec<NuggetType>>,
}

impl Default for TwoPhaseOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            quality_warning_ratio: 0.6,
            temperature: 0.7,
            ensemble: None,
            selected_types: None,
        }
    }
}

impl TwoPhaseOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Use ensemble extraction for phase 1.
    pub fn with_ensemble(mut self, ensemble: EnsembleOptions) -> Self {
        self.ensemble = Some(ensemble);
        self
    }

    /// Restrict to specific types.
    pub fn with_types(mut self, types: impl IntoIterator<Item = NuggetType>) -> Self {
        self.selected_types = Some(types.into_iter().collect());
        self
    }
}

/// Which entry a full cache gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest inserted entry
    #[default]
    Fifo,

    /// Least recently read entry
    Lru,
}

/// Configuration for the embedding cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached vectors.
    pub max_entries: usize,

    /// Entries older than this are dropped on read.
    pub ttl_ms: u64,

    /// Eviction policy on overflow.
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            // Embeddings are stable for a given model, cache for 1 hour
            ttl_ms: 60 * 60 * 1000,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

impl CacheConfig {
    /// Set the capacity.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the time-to-live.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Set the eviction policy.
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }
}

/// Timeout and retry policy for provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Per-attempt timeout.
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles each attempt.
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Set the per-attempt timeout.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the retry cap.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base backoff delay.
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// All configuration in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NuggetConfig {
    pub boundary: BoundaryConfig,
    pub ensemble: EnsembleOptions,
    pub two_phase: TwoPhaseOptions,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
}

impl NuggetConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ExtractionError::Config(Box::new(e)))?;
        Self::from_json(&text)
    }

    /// Load from the file named by `NUGGETS_CONFIG`, or defaults if unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(path),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(ExtractionError::Config(Box::new(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = NuggetConfig::from_json(
            r#"{
                "boundary": {"fuzzy_tolerance": 0.7},
                "ensemble": {"runs": 5, "similarity": {"use_embeddings": false}},
                "cache": {"eviction": "lru"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.boundary.fuzzy_tolerance, 0.7);
        assert_eq!(config.boundary.refinement_window, 50);
        assert_eq!(config.ensemble.runs, 5);
        assert!(!config.ensemble.similarity.use_embeddings);
        assert_eq!(config.ensemble.similarity.embedding_threshold, 0.75);
        assert_eq!(config.cache.eviction, EvictionPolicy::Lru);
        assert_eq!(config.two_phase.confidence_threshold, 0.85);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            NuggetConfig::from_json("{not json"),
            Err(ExtractionError::JsonParse(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig::default()
            .with_base_delay_ms(100)
            .with_max_retries(5);
        assert_eq!(retry.backoff_ms(0), 100);
        assert_eq!(retry.backoff_ms(1), 200);
        assert_eq!(retry.backoff_ms(3), 800);

        let capped = RetryConfig {
            max_delay_ms: 300,
            ..retry
        };
        assert_eq!(capped.backoff_ms(4), 300);
        assert_eq!(capped.backoff_ms(63), 300);
    }

    #[test]
    fn test_effective_runs_at_least_one() {
        assert_eq!(EnsembleOptions::new().with_runs(0).effective_runs(), 1);
        assert_eq!(EnsembleOptions::new().with_runs(4).effective_runs(), 4);
    }
}
