//! Grouping of equivalent nuggets across runs.
//!
//! Fragments are compared by embedding cosine similarity when an embedder
//! is available, and by word overlap otherwise. Clustering is greedy and
//! single-link: each fragment joins the first existing group holding any
//! member similar enough, or starts a new group. That is order-dependent
//! and not globally optimal, but deterministic for a given input order, and
//! confidence thresholds downstream are calibrated against it.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::embedding::{EmbeddingCache, EmbeddingKey};
use crate::error::{ExtractionError, Result};
use crate::matching::fuzzy::words;
use crate::matching::normalize::normalize;
use crate::traits::embedder::{cosine_similarity, normalize_vector, Embedder};
use crate::types::config::SimilarityOptions;
use crate::types::nugget::{SimilarityMethod, TaggedExtraction};

/// Groups of fragment indices, plus how they were formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    /// Indices into the input slice; groups and members in first-seen order.
    pub groups: Vec<Vec<usize>>,
    pub method: SimilarityMethod,
}

/// Greedy single-link clustering of `count` items.
///
/// Item `i` joins the first group containing any `j` with `similar(j, i)`.
pub fn greedy_groups(count: usize, mut similar: impl FnMut(usize, usize) -> bool) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for item in 0..count {
        match groups
            .iter_mut()
            .find(|group| group.iter().any(|&member| similar(member, item)))
        {
            Some(group) => group.push(item),
            None => groups.push(vec![item]),
        }
    }

    groups
}

/// Jaccard overlap of the normalized word sets of two texts.
pub fn word_overlap(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    let a: HashSet<&str> = words(&a).into_iter().map(|w| w.text).collect();
    let b: HashSet<&str> = words(&b).into_iter().map(|w| w.text).collect();

    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Lexical grouping: same type and enough word overlap with any member.
pub fn group_lexically(fragments: &[TaggedExtraction], threshold: f32) -> Vec<Vec<usize>> {
    let texts: Vec<String> = fragments
        .iter()
        .map(|f| f.extraction.representative_text())
        .collect();

    greedy_groups(fragments.len(), |a, b| {
        fragments[a].extraction.nugget_type == fragments[b].extraction.nugget_type
            && word_overlap(&texts[a], &texts[b]) >= threshold
    })
}

/// Groups equivalent fragments.
///
/// Owns (or shares) an [`EmbeddingCache`]; construct one per embedder.
pub struct SimilarityMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    cache: Arc<EmbeddingCache>,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::lexical()
    }
}

impl SimilarityMatcher {
    /// A matcher with no embedder; always groups lexically.
    pub fn lexical() -> Self {
        Self {
            embedder: None,
            cache: Arc::new(EmbeddingCache::default()),
        }
    }

    /// A matcher backed by `embedder`, with a fresh default cache.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_cache(embedder, Arc::new(EmbeddingCache::default()))
    }

    /// A matcher backed by `embedder` and an existing cache.
    pub fn with_cache(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            embedder: Some(embedder),
            cache,
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Group `fragments` into equivalence classes.
    ///
    /// Never fails: an embedding failure falls back to lexical grouping and
    /// reports [`SimilarityMethod::Fallback`].
    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub async fn group_similar(
        &self,
        fragments: &[TaggedExtraction],
        options: &SimilarityOptions,
    ) -> Grouping {
        let embedder = self.embedder.as_ref().filter(|_| options.use_embeddings);

        let Some(embedder) = embedder else {
            return Grouping {
                groups: group_lexically(fragments, options.word_overlap_threshold),
                method: SimilarityMethod::WordOverlap,
            };
        };

        if fragments.is_empty() {
            return Grouping {
                groups: Vec::new(),
                method: SimilarityMethod::Embedding,
            };
        }

        let texts: Vec<String> = fragments
            .iter()
            .map(|f| f.extraction.representative_text())
            .collect();

        match self.embed_all(&**embedder, &texts, options).await {
            Ok(vectors) => {
                let groups = greedy_groups(fragments.len(), |a, b| {
                    cosine_similarity(&vectors[a], &vectors[b]) >= options.embedding_threshold
                });
                debug!(groups = groups.len(), "Grouped by embedding similarity");
                Grouping {
                    groups,
                    method: SimilarityMethod::Embedding,
                }
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed, falling back to word overlap");
                Grouping {
                    groups: group_lexically(fragments, options.word_overlap_threshold),
                    method: SimilarityMethod::Fallback,
                }
            }
        }
    }

    /// Embed every text, deduplicated, through the cache and in batches.
    async fn embed_all(
        &self,
        embedder: &dyn Embedder,
        texts: &[String],
        options: &SimilarityOptions,
    ) -> Result<Vec<Arc<[f32]>>> {
        let embed_options = options.embed_options();
        let native = embedder.native_dimensions();
        let expected = options.dimensions.unwrap_or(native);
        if expected == 0 {
            return Err(ExtractionError::Embedding(
                "embedder reports zero dimensions".to_string(),
            ));
        }

        let mut unique: IndexMap<&str, Option<Arc<[f32]>>> = IndexMap::new();
        for text in texts {
            unique.entry(text.as_str()).or_insert_with(|| {
                self.cache.get(&EmbeddingKey::new(text, &embed_options))
            });
        }

        let missing: Vec<&str> = unique
            .iter()
            .filter(|(_, vector)| vector.is_none())
            .map(|(text, _)| *text)
            .collect();

        let batch_size = options.batch_size.min(embedder.max_batch_size()).max(1);
        debug!(
            unique = unique.len(),
            missing = missing.len(),
            batch_size,
            "Embedding fragments"
        );

        for batch in missing.chunks(batch_size) {
            let vectors = embedder.embed(batch, &embed_options).await?;
            if vectors.len() != batch.len() {
                return Err(ExtractionError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (text, mut vector) in batch.iter().copied().zip(vectors) {
                if vector.len() != expected {
                    return Err(ExtractionError::Embedding(format!(
                        "expected {} dimensions, got {}",
                        expected,
                        vector.len()
                    )));
                }
                if expected != native {
                    normalize_vector(&mut vector);
                }
                self.cache
                    .insert(EmbeddingKey::new(text, &embed_options), vector.clone());
                unique.insert(text, Some(vector.into()));
            }
        }

        texts
            .iter()
            .map(|text| {
                unique
                    .get(text.as_str())
                    .cloned()
                    .flatten()
                    .ok_or_else(|| ExtractionError::Embedding(format!("no vector for {text:?}")))
            })
            .collect()
    }
}

impl std::fmt::Debug for SimilarityMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityMatcher")
            .field("has_embedder", &self.has_embedder())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEmbedder, MockEmbedderMode};
    use crate::types::nugget::{NuggetType, RawExtraction};

    fn tagged(run: usize, nugget_type: NuggetType, text: &str) -> TaggedExtraction {
        TaggedExtraction::new(run, 0, RawExtraction::with_full_content(nugget_type, text))
    }

    #[test]
    fn test_greedy_groups_first_compatible_wins() {
        // 0~1, 1~2, 0!~2: single link chains 2 into 0's group via 1.
        let similar = |a: usize, b: usize| a.abs_diff(b) == 1;
        assert_eq!(greedy_groups(3, similar), vec![vec![0, 1, 2]]);
        assert_eq!(greedy_groups(0, similar), Vec::<Vec<usize>>::new());
    }

    #[test]
    fn test_word_overlap() {
        assert_eq!(word_overlap("The cat sat", "the CAT sat"), 1.0);
        assert_eq!(word_overlap("a b", "c d"), 0.0);
        assert_eq!(word_overlap("", ""), 0.0);
        assert!((word_overlap("a b c", "a b d") - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_lexical_requires_same_type() {
        let fragments = vec![
            tagged(0, NuggetType::Tool, "use ripgrep for fast search"),
            tagged(1, NuggetType::Media, "use ripgrep for fast search"),
            tagged(2, NuggetType::Tool, "Use ripgrep for fast search!"),
        ];
        let grouping = SimilarityMatcher::lexical()
            .group_similar(&fragments, &SimilarityOptions::default())
            .await;

        assert_eq!(grouping.method, SimilarityMethod::WordOverlap);
        assert_eq!(grouping.groups, vec![vec![0, 2], vec![1]]);
    }

    #[tokio::test]
    async fn test_embedding_grouping_with_cache() {
        let embedder = Arc::new(
            MockEmbedder::new()
                .with_dimensions(3)
                .with_vector("alpha", vec![1.0, 0.0, 0.0])
                .with_vector("alpha again", vec![0.9, 0.1, 0.0])
                .with_vector("beta", vec![0.0, 1.0, 0.0]),
        );
        let matcher = SimilarityMatcher::new(embedder.clone());
        let fragments = vec![
            tagged(0, NuggetType::Tool, "alpha"),
            tagged(1, NuggetType::Model, "alpha again"),
            tagged(2, NuggetType::Tool, "beta"),
            tagged(2, NuggetType::Tool, "alpha"),
        ];
        let options = SimilarityOptions::default();

        let grouping = matcher.group_similar(&fragments, &options).await;
        assert_eq!(grouping.method, SimilarityMethod::Embedding);
        assert_eq!(grouping.groups, vec![vec![0, 1, 3], vec![2]]);
        // "alpha" appears twice but is embedded once.
        assert_eq!(embedder.embedded_count(), 3);

        matcher.group_similar(&fragments, &options).await;
        assert_eq!(embedder.embedded_count(), 3);
        assert_eq!(matcher.cache().stats().hits, 3);
    }

    #[tokio::test]
    async fn test_embedding_grouping_is_deterministic() {
        let embedder = || {
            Arc::new(
                MockEmbedder::new()
                    .with_dimensions(3)
                    .with_vector("fast search", vec![1.0, 0.0, 0.0])
                    .with_vector("quick search", vec![0.8, 0.6, 0.0])
                    .with_vector("search fast", vec![0.6, 0.8, 0.0])
                    .with_vector("slow build", vec![0.0, 0.0, 1.0]),
            )
        };
        let fragments = vec![
            tagged(0, NuggetType::Tool, "fast search"),
            tagged(0, NuggetType::Tool, "slow build"),
            tagged(1, NuggetType::Tool, "search fast"),
            tagged(1, NuggetType::Tool, "quick search"),
        ];
        let options = SimilarityOptions {
            embedding_threshold: 0.75,
            ..SimilarityOptions::default()
        };

        let first = SimilarityMatcher::new(embedder())
            .group_similar(&fragments, &options)
            .await;
        let second = SimilarityMatcher::new(embedder())
            .group_similar(&fragments, &options)
            .await;

        assert_eq!(first.method, SimilarityMethod::Embedding);
        assert_eq!(first, second);
        // "search fast" (0.6 to "fast search") opens its own group before
        // "quick search" (0.8) joins the first one.
        assert_eq!(first.groups, vec![vec![0, 3], vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_batches_respect_embedder_limit() {
        let embedder = Arc::new(MockEmbedder::new().with_max_batch_size(2));
        let matcher = SimilarityMatcher::new(embedder.clone());
        let fragments: Vec<_> = (0..5)
            .map(|i| tagged(i, NuggetType::Tool, &format!("text {i}")))
            .collect();

        matcher
            .group_similar(&fragments, &SimilarityOptions::default())
            .await;
        assert_eq!(embedder.batch_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_embedding_failures_fall_back() {
        let fragments = vec![
            tagged(0, NuggetType::Tool, "use ripgrep"),
            tagged(1, NuggetType::Tool, "use ripgrep"),
        ];

        for mode in [MockEmbedderMode::Failing, MockEmbedderMode::ShortBatch] {
            let matcher = SimilarityMatcher::new(Arc::new(MockEmbedder::new().with_mode(mode)));
            let grouping = matcher
                .group_similar(&fragments, &SimilarityOptions::default())
                .await;
            assert_eq!(grouping.method, SimilarityMethod::Fallback);
            assert_eq!(grouping.groups, vec![vec![0, 1]]);
        }
    }

    #[tokio::test]
    async fn test_wrong_dimensions_fall_back() {
        let embedder = MockEmbedder::new()
            .with_dimensions(4)
            .with_vector("short", vec![1.0, 0.0]);
        let matcher = SimilarityMatcher::new(Arc::new(embedder));
        let fragments = vec![tagged(0, NuggetType::Tool, "short")];

        let grouping = matcher
            .group_similar(&fragments, &SimilarityOptions::default())
            .await;
        assert_eq!(grouping.method, SimilarityMethod::Fallback);
    }

    #[tokio::test]
    async fn test_truncated_dimensions_are_normalized_and_cached_separately() {
        let embedder = Arc::new(MockEmbedder::new().with_dimensions(16));
        let matcher = SimilarityMatcher::new(embedder.clone());
        let fragments = vec![tagged(0, NuggetType::Tool, "some text")];

        let truncated = SimilarityOptions::default().with_dimensions(8);
        let grouping = matcher.group_similar(&fragments, &truncated).await;
        assert_eq!(grouping.method, SimilarityMethod::Embedding);

        matcher
            .group_similar(&fragments, &SimilarityOptions::default())
            .await;
        assert_eq!(embedder.embedded_count(), 2);
        assert_eq!(matcher.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_embeddings_use_word_overlap() {
        let embedder = Arc::new(MockEmbedder::new());
        let matcher = SimilarityMatcher::new(embedder.clone());
        let fragments = vec![tagged(0, NuggetType::Tool, "x")];

        let grouping = matcher
            .group_similar(&fragments, &SimilarityOptions::lexical())
            .await;
        assert_eq!(grouping.method, SimilarityMethod::WordOverlap);
        assert_eq!(embedder.embedded_count(), 0);
    }
}
