//! Multi-run ensemble extraction.
//!
//! LLM extraction is non-deterministic, so a single call both misses real
//! nuggets and invents weak ones. [`ConsensusBuilder`] issues several
//! independent calls concurrently, groups equivalent nuggets across runs,
//! and scores each group by how many runs reported it.
//!
//! # Example
//!
//! ```rust,ignore
//! use nuggets::{ConsensusBuilder, EnsembleOptions};
//!
//! let builder = ConsensusBuilder::default();
//! let result = builder
//!     .extract_with_ensemble(&page, &prompt, &provider, &EnsembleOptions::default())
//!     .await;
//!
//! for nugget in &result.nuggets {
//!     println!("{:.2} {}", nugget.confidence, nugget.nugget.representative_text());
//! }
//! ```

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::settle::{settle_all, timed};
use crate::pipeline::similarity::SimilarityMatcher;
use crate::traits::provider::ExtractionProvider;
use crate::types::config::{EnsembleOptions, ExtractionMode, SimilarityOptions};
use crate::types::nugget::{
    ConsensusNugget, EnsembleMetadata, EnsembleResult, RawExtraction, SimilarityMethod,
    TaggedExtraction,
};

/// Builds consensus nuggets from repeated extraction runs.
#[derive(Debug, Default)]
pub struct ConsensusBuilder {
    similarity: SimilarityMatcher,
}

/// Consensus over already-collected runs.
#[derive(Debug, Clone)]
pub struct Consensus {
    pub nuggets: Vec<ConsensusNugget>,
    pub fragments: usize,
    pub method: SimilarityMethod,
}

impl ConsensusBuilder {
    pub fn new(similarity: SimilarityMatcher) -> Self {
        Self { similarity }
    }

    pub fn similarity(&self) -> &SimilarityMatcher {
        &self.similarity
    }

    /// Run `options.runs` extractions concurrently and reconcile them.
    ///
    /// Never fails: failed runs are logged and excluded, and if every run
    /// fails the result is empty with the failure counts in its metadata.
    #[instrument(skip_all, fields(provider = provider.name(), runs = options.effective_runs()))]
    pub async fn extract_with_ensemble<P>(
        &self,
        content: &str,
        prompt: &str,
        provider: &P,
        options: &EnsembleOptions,
    ) -> EnsembleResult
    where
        P: ExtractionProvider + ?Sized,
    {
        let total_runs = options.effective_runs();
        let types = options.selected_types.as_deref();
        let temperature = Some(options.temperature);

        let tasks = (0..total_runs).map(|run| async move {
            let call = match options.mode {
                ExtractionMode::Standard => provider.extract(content, prompt, temperature, types),
                ExtractionMode::HighRecall => {
                    provider.extract_high_recall(content, prompt, temperature, types)
                }
            };
            let (result, elapsed) = timed(call).await;
            debug!(run, elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "Run settled");
            result.map(|nuggets| (nuggets, elapsed))
        });

        let settled = settle_all(tasks).await;
        for (run, e) in &settled.failures {
            warn!(run, error = %e, "Ensemble run failed");
        }

        let successful_runs = settled.successes.len();
        let failed_runs = settled.failures.len();
        let total_elapsed: Duration = settled.successes.iter().map(|(_, (_, t))| *t).sum();
        let average_response_time_ms = if successful_runs == 0 {
            0
        } else {
            (total_elapsed.as_millis() / successful_runs as u128) as u64
        };

        let runs: Vec<(usize, Vec<RawExtraction>)> = settled
            .successes
            .into_iter()
            .map(|(run, (nuggets, _))| (run, nuggets))
            .collect();

        let consensus = self
            .build_consensus(runs, total_runs, &options.similarity)
            .await;

        let metadata = EnsembleMetadata {
            total_runs,
            successful_runs,
            failed_runs,
            consensus_reached: consensus.nuggets.len(),
            duplicates_removed: consensus.fragments - consensus.nuggets.len(),
            average_response_time_ms,
            similarity_method: consensus.method,
        };

        info!(
            successful_runs,
            failed_runs,
            fragments = consensus.fragments,
            nuggets = metadata.consensus_reached,
            method = ?metadata.similarity_method,
            "Ensemble extraction complete"
        );

        EnsembleResult {
            nuggets: consensus.nuggets,
            metadata,
        }
    }

    /// Group the nuggets of successful runs and score each group.
    ///
    /// `runs` holds `(run_id, nuggets)` for every run that succeeded; its
    /// length is the denominator of each confidence. Output is sorted by
    /// confidence, highest first, keeping first-seen order among ties.
    pub async fn build_consensus(
        &self,
        runs: Vec<(usize, Vec<RawExtraction>)>,
        total_runs: usize,
        options: &SimilarityOptions,
    ) -> Consensus {
        let successful_runs = runs.len();

        let mut fragments = Vec::new();
        for (run_id, nuggets) in runs {
            for (index, nugget) in nuggets.into_iter().enumerate() {
                if !nugget.is_locatable() {
                    debug!(run_id, index, "Skipping nugget with no content");
                    continue;
                }
                fragments.push(TaggedExtraction::new(run_id, index, nugget));
            }
        }

        let grouping = self.similarity.group_similar(&fragments, options).await;

        let mut nuggets: Vec<ConsensusNugget> = grouping
            .groups
            .iter()
            .filter_map(|group| {
                let first = fragments.get(*group.first()?)?;
                let run_ids: BTreeSet<usize> =
                    group.iter().map(|&idx| fragments[idx].run_id).collect();
                let supporting_runs = run_ids.len();

                Some(ConsensusNugget {
                    nugget: first.extraction.clone(),
                    confidence: supporting_runs as f32 / successful_runs as f32,
                    supporting_runs,
                    total_runs: total_runs.max(successful_runs),
                    similarity_method: grouping.method,
                    run_ids: run_ids.into_iter().collect(),
                })
            })
            .collect();

        // Stable sort keeps first-seen order among equal confidences.
        nuggets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        Consensus {
            nuggets,
            fragments: fragments.len(),
            method: grouping.method,
        }
    }
}
