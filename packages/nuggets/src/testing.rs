//! Testing utilities.
//!
//! Mock collaborators for exercising the matching and consensus pipeline
//! without real LLM or embedding calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ExtractionError, Result};
use crate::traits::{
    embedder::{EmbedOptions, Embedder},
    provider::ExtractionProvider,
};
use crate::types::nugget::{NuggetType, RawExtraction};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub struct MockRun {
    delay: Option<Duration>,
    outcome: std::result::Result<Vec<RawExtraction>, String>,
}

impl MockRun {
    /// A successful reply.
    pub fn ok(nuggets: Vec<RawExtraction>) -> Self {
        Self {
            delay: None,
            outcome: Ok(nuggets),
        }
    }

    /// A failed reply (surfaces as [`ExtractionError::Provider`]).
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            delay: None,
            outcome: Err(message.into()),
        }
    }

    /// Delay the reply.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn resolve(self) -> Result<Vec<RawExtraction>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.map_err(ExtractionError::provider)
    }
}

/// Record of a call made to the mock provider.
#[derive(Debug, Clone, PartialEq)]
pub enum MockProviderCall {
    Extract {
        temperature: Option<f32>,
        selected_types: Option<Vec<NuggetType>>,
    },
    ExtractHighRecall {
        temperature: Option<f32>,
        selected_types: Option<Vec<NuggetType>>,
    },
    DetectBoundaries {
        nugget_count: usize,
    },
}

/// A scripted extraction provider.
///
/// Replies are consumed in order, one per call; once the script runs out
/// every call gets the default reply (empty unless set). Scripts are popped
/// when a call starts, so concurrent runs see them in issue order.
#[derive(Default)]
pub struct MockProvider {
    runs: Arc<RwLock<VecDeque<MockRun>>>,
    high_recall_runs: Arc<RwLock<VecDeque<MockRun>>>,
    boundary_runs: Arc<RwLock<VecDeque<MockRun>>>,
    default_nuggets: Vec<RawExtraction>,
    calls: Arc<RwLock<Vec<MockProviderCall>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful standard run.
    pub fn with_run(self, nuggets: Vec<RawExtraction>) -> Self {
        self.with_scripted(MockRun::ok(nuggets))
    }

    /// Script a failed standard run.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.with_scripted(MockRun::fail(message))
    }

    /// Script any standard run.
    pub fn with_scripted(self, run: MockRun) -> Self {
        self.runs.write().unwrap().push_back(run);
        self
    }

    /// Script a high-recall run. Without one, high-recall calls consume the
    /// standard script.
    pub fn with_high_recall(self, run: MockRun) -> Self {
        self.high_recall_runs.write().unwrap().push_back(run);
        self
    }

    /// Script a boundary-detection reply. Without one, boundary detection
    /// is unsupported.
    pub fn with_boundaries(self, run: MockRun) -> Self {
        self.boundary_runs.write().unwrap().push_back(run);
        self
    }

    /// Reply used once the script is exhausted.
    pub fn with_default(mut self, nuggets: Vec<RawExtraction>) -> Self {
        self.default_nuggets = nuggets;
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockProviderCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn next_run(&self, queue: &RwLock<VecDeque<MockRun>>) -> MockRun {
        queue
            .write()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockRun::ok(self.default_nuggets.clone()))
    }
}

#[async_trait]
impl ExtractionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(
        &self,
        _content: &str,
        _prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        self.calls.write().unwrap().push(MockProviderCall::Extract {
            temperature,
            selected_types: selected_types.map(<[NuggetType]>::to_vec),
        });
        self.next_run(&self.runs).resolve().await
    }

    async fn extract_high_recall(
        &self,
        _content: &str,
        _prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        self.calls
            .write()
            .unwrap()
            .push(MockProviderCall::ExtractHighRecall {
                temperature,
                selected_types: selected_types.map(<[NuggetType]>::to_vec),
            });
        let scripted = self.high_recall_runs.write().unwrap().pop_front();
        let run = scripted.unwrap_or_else(|| self.next_run(&self.runs));
        run.resolve().await
    }

    async fn detect_boundaries(
        &self,
        _content: &str,
        nuggets: &[RawExtraction],
    ) -> Result<Vec<RawExtraction>> {
        self.calls
            .write()
            .unwrap()
            .push(MockProviderCall::DetectBoundaries {
                nugget_count: nuggets.len(),
            });
        let scripted = self.boundary_runs.write().unwrap().pop_front();
        match scripted {
            Some(run) => run.resolve().await,
            None => Err(ExtractionError::Unsupported {
                operation: "detect_boundaries",
            }),
        }
    }
}

/// How the mock embedder misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockEmbedderMode {
    #[default]
    Normal,

    /// Every call fails
    Failing,

    /// Every batch comes back one vector short
    ShortBatch,
}

/// A mock embedder.
///
/// Returns predefined vectors where set, otherwise a deterministic vector
/// seeded from a SHA-256 of the text.
pub struct MockEmbedder {
    vectors: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    dimensions: usize,
    max_batch: usize,
    mode: MockEmbedderMode,
    batches: Arc<RwLock<Vec<usize>>>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            vectors: Arc::default(),
            dimensions: 64,
            max_batch: 100,
            mode: MockEmbedderMode::Normal,
            batches: Arc::default(),
        }
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the native dimensionality.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set the largest batch per call.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    pub fn with_mode(mut self, mode: MockEmbedderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a predefined vector for a text.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.write().unwrap().insert(text.into(), vector);
        self
    }

    /// Sizes of the batches received, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().unwrap().clone()
    }

    /// Total texts embedded across all calls.
    pub fn embedded_count(&self) -> usize {
        self.batches.read().unwrap().iter().sum()
    }

    fn deterministic_vector(text: &str, dimensions: usize) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let hash = Sha256::digest(text.as_bytes());
        (0..dimensions)
            .map(|i| (hash[i % 32] as f32 / 127.5) - 1.0)
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str], options: &EmbedOptions) -> Result<Vec<Vec<f32>>> {
        self.batches.write().unwrap().push(texts.len());

        if self.mode == MockEmbedderMode::Failing {
            return Err(ExtractionError::Embedding("mock embedder failure".to_string()));
        }

        let dimensions = options.dimensions.unwrap_or(self.dimensions);
        let vectors = self.vectors.read().unwrap();
        let mut out: Vec<Vec<f32>> = texts
            .iter()
            .map(|text| {
                vectors
                    .get(*text)
                    .map(|v| v.iter().copied().take(dimensions).collect())
                    .unwrap_or_else(|| Self::deterministic_vector(text, dimensions))
            })
            .collect();

        if self.mode == MockEmbedderMode::ShortBatch {
            out.pop();
        }
        Ok(out)
    }

    fn native_dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_script_then_default() {
        let n = RawExtraction::with_fragments(NuggetType::Tool, "a", "b");
        let provider = MockProvider::new()
            .with_run(vec![n.clone()])
            .with_failure("boom");

        assert_eq!(provider.extract("c", "p", Some(0.7), None).await.unwrap(), vec![n]);
        assert!(provider.extract("c", "p", None, None).await.is_err());
        assert!(provider.extract("c", "p", None, None).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(
            provider.calls()[0],
            MockProviderCall::Extract {
                temperature: Some(0.7),
                selected_types: None
            }
        );
    }

    #[tokio::test]
    async fn test_mock_provider_boundaries_unsupported_by_default() {
        let provider = MockProvider::new();
        let err = provider.detect_boundaries("c", &[]).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new().with_dimensions(8);
        let options = EmbedOptions::default();

        let a = embedder.embed(&["hello", "world"], &options).await.unwrap();
        let b = embedder.embed(&["hello"], &options).await.unwrap();
        assert_eq!(a[0], b[0]);
        assert_ne!(a[0], a[1]);
        assert_eq!(a[0].len(), 8);
        assert_eq!(embedder.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_mock_embedder_modes() {
        let options = EmbedOptions::default();

        let failing = MockEmbedder::new().with_mode(MockEmbedderMode::Failing);
        assert!(failing.embed(&["x"], &options).await.is_err());

        let short = MockEmbedder::new().with_mode(MockEmbedderMode::ShortBatch);
        assert_eq!(short.embed(&["x", "y"], &options).await.unwrap().len(), 1);
    }
}
