//! Two-phase extraction.
//!
//! Phase 1 asks for everything that might be a nugget, with a self-reported
//! confidence, and keeps only the confident ones. Phase 2 locates each
//! survivor in the page: mechanically first (the boundary matcher), then
//! with a single LLM boundary-detection call for whatever is left.
//!
//! ```text
//! Phase1-HighRecall -> ConfidenceFilter -> Phase2 (matcher -> LLM) -> Done
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::matching::boundary::BoundaryMatcher;
use crate::matching::reconstruct::ContentReconstructor;
use crate::pipeline::consensus::ConsensusBuilder;
use crate::traits::provider::ExtractionProvider;
use crate::types::config::{ExtractionMode, TwoPhaseOptions};
use crate::types::nugget::{FragmentPair, RawExtraction};
use crate::types::span::{MatchResult, NormalizedSpan};

/// Which phase-2 path located a nugget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    /// Mechanical boundary matcher
    Fuzzy,

    /// LLM boundary detection
    Llm,
}

/// A nugget that survived filtering and was located in the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoPhaseNugget {
    /// The nugget, with fragments and full content as located
    pub nugget: RawExtraction,

    /// Phase-1 confidence that this is a genuine nugget
    pub confidence: f32,

    /// Confidence in the located boundaries
    pub boundary_confidence: f32,

    pub boundary_source: BoundarySource,

    /// Span in the page, when the matcher confirmed one
    pub span: Option<NormalizedSpan>,

    /// Text to display
    pub content: String,
}

/// Counts and timings for one two-phase extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoPhaseMetadata {
    pub phase1_count: usize,
    pub filtered_count: usize,
    pub fuzzy_matched: usize,
    pub llm_matched: usize,
    pub unresolved: usize,
    pub confidence_threshold: f32,
    pub phase1_ms: u64,
    pub phase2_ms: u64,
    pub total_ms: u64,

    /// Most phase-1 nuggets were filtered out
    pub quality_warning: bool,

    /// Nothing survived the confidence filter; phase 2 was skipped
    pub no_nuggets_passed: bool,
}

/// Output of [`TwoPhaseCoordinator::extract_with_two_phase`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwoPhaseResult {
    /// Located nuggets, in phase-1 order
    pub nuggets: Vec<TwoPhaseNugget>,

    /// Survivors neither path could locate
    pub unresolved: Vec<RawExtraction>,

    pub metadata: TwoPhaseMetadata,
}

/// A survivor of the confidence filter, with its phase-1 position.
struct Candidate {
    order: usize,
    nugget: RawExtraction,
    confidence: f32,
}

/// Orchestrates high-recall extraction, filtering, and boundary detection.
#[derive(Debug)]
pub struct TwoPhaseCoordinator {
    matcher: Arc<BoundaryMatcher>,
    reconstructor: ContentReconstructor,
    consensus: ConsensusBuilder,
}

impl Default for TwoPhaseCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(BoundaryMatcher::default()), ConsensusBuilder::default())
    }
}

impl TwoPhaseCoordinator {
    pub fn new(matcher: Arc<BoundaryMatcher>, consensus: ConsensusBuilder) -> Self {
        Self {
            reconstructor: ContentReconstructor::new(Arc::clone(&matcher)),
            matcher,
            consensus,
        }
    }

    /// Extract, filter, and locate nuggets.
    ///
    /// Never fails. Provider errors in phase 1 yield an empty result; a
    /// failed boundary-detection call leaves its nuggets unresolved.
    #[instrument(skip_all, fields(provider = provider.name()))]
    pub async fn extract_with_two_phase<P>(
        &self,
        content: &str,
        prompt: &str,
        provider: &P,
        options: &TwoPhaseOptions,
    ) -> TwoPhaseResult
    where
        P: ExtractionProvider + ?Sized,
    {
        let started = Instant::now();
        let mut metadata = TwoPhaseMetadata {
            confidence_threshold: options.confidence_threshold,
            ..Default::default()
        };

        // Phase 1
        let phase1 = self.phase_one(content, prompt, provider, options).await;
        metadata.phase1_count = phase1.len();
        metadata.phase1_ms = started.elapsed().as_millis() as u64;

        let survivors: Vec<Candidate> = phase1
            .into_iter()
            .enumerate()
            .filter(|(_, (_, confidence))| *confidence >= options.confidence_threshold)
            .map(|(order, (nugget, confidence))| Candidate {
                order,
                nugget,
                confidence,
            })
            .collect();
        metadata.filtered_count = survivors.len();

        if survivors.is_empty() {
            info!(
                phase1_count = metadata.phase1_count,
                threshold = options.confidence_threshold,
                "No nuggets passed the confidence filter"
            );
            metadata.no_nuggets_passed = true;
            metadata.total_ms = started.elapsed().as_millis() as u64;
            return TwoPhaseResult {
                metadata,
                ..Default::default()
            };
        }

        let removed = metadata.phase1_count - metadata.filtered_count;
        if removed as f32 / metadata.phase1_count as f32 > options.quality_warning_ratio {
            warn!(
                removed,
                phase1_count = metadata.phase1_count,
                threshold = options.confidence_threshold,
                "Most phase-1 nuggets fell below the confidence threshold"
            );
            metadata.quality_warning = true;
        }

        // Phase 2
        let phase2_started = Instant::now();
        let (mut located, pending) = self.locate_mechanically(survivors, content);
        metadata.fuzzy_matched = located.len();

        let mut unresolved = Vec::new();
        if !pending.is_empty() {
            let (by_llm, leftover) = self.locate_with_llm(pending, content, provider).await;
            metadata.llm_matched = by_llm.len();
            located.extend(by_llm);
            unresolved = leftover;
        }
        metadata.unresolved = unresolved.len();
        metadata.phase2_ms = phase2_started.elapsed().as_millis() as u64;
        metadata.total_ms = started.elapsed().as_millis() as u64;

        located.sort_by_key(|(order, _)| *order);
        unresolved.sort_by_key(|c| c.order);

        info!(
            phase1_count = metadata.phase1_count,
            filtered = metadata.filtered_count,
            fuzzy = metadata.fuzzy_matched,
            llm = metadata.llm_matched,
            unresolved = metadata.unresolved,
            total_ms = metadata.total_ms,
            "Two-phase extraction complete"
        );

        TwoPhaseResult {
            nuggets: located.into_iter().map(|(_, n)| n).collect(),
            unresolved: unresolved.into_iter().map(|c| c.nugget).collect(),
            metadata,
        }
    }

    /// High-recall extraction: `(nugget, confidence)` in reported order.
    async fn phase_one<P>(
        &self,
        content: &str,
        prompt: &str,
        provider: &P,
        options: &TwoPhaseOptions,
    ) -> Vec<(RawExtraction, f32)>
    where
        P: ExtractionProvider + ?Sized,
    {
        match &options.ensemble {
            Some(ensemble) => {
                let mut ensemble = ensemble.clone().with_mode(ExtractionMode::HighRecall);
                if ensemble.selected_types.is_none() {
                    ensemble.selected_types = options.selected_types.clone();
                }
                let result = self
                    .consensus
                    .extract_with_ensemble(content, prompt, provider, &ensemble)
                    .await;
                result
                    .nuggets
                    .into_iter()
                    .map(|n| (n.nugget, n.confidence))
                    .collect()
            }
            None => {
                let types = options.selected_types.as_deref();
                match provider
                    .extract_high_recall(content, prompt, Some(options.temperature), types)
                    .await
                {
                    Ok(nuggets) => nuggets
                        .into_iter()
                        .filter(RawExtraction::is_locatable)
                        .map(|n| {
                            let confidence = n.confidence.unwrap_or(0.0);
                            (n, confidence)
                        })
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "High-recall extraction failed");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Locate candidates with the boundary matcher. Returns located nuggets
    /// (keyed by phase-1 order) and the candidates it could not place.
    fn locate_mechanically(
        &self,
        candidates: Vec<Candidate>,
        content: &str,
    ) -> (Vec<(usize, TwoPhaseNugget)>, Vec<Candidate>) {
        let words = self.matcher.config().fragment_words;
        let mut located = Vec::new();
        let mut pending = Vec::new();

        for candidate in candidates {
            let pair = candidate.nugget.fragment_pair().or_else(|| {
                candidate
                    .nugget
                    .full_text()
                    .map(|text| FragmentPair::from_full_content(text, words))
            });

            let Some(pair) = pair else {
                pending.push(candidate);
                continue;
            };
            let MatchResult::Success(span) = self.matcher.find_boundary(&pair, content) else {
                pending.push(candidate);
                continue;
            };

            let nugget = RawExtraction {
                nugget_type: candidate.nugget.nugget_type,
                start_content: Some(pair.start),
                end_content: Some(pair.end),
                full_content: Some(span.matched_text.clone()),
                confidence: Some(candidate.confidence),
            };
            located.push((
                candidate.order,
                TwoPhaseNugget {
                    nugget,
                    confidence: candidate.confidence,
                    boundary_confidence: span.confidence,
                    boundary_source: BoundarySource::Fuzzy,
                    content: span.matched_text.clone(),
                    span: Some(span),
                },
            ));
        }

        debug!(located = located.len(), pending = pending.len(), "Mechanical boundary pass done");
        (located, pending)
    }

    /// One boundary-detection call for everything the matcher missed.
    ///
    /// Replies are matched to requests by position; missing or empty
    /// replies leave the candidate unresolved.
    async fn locate_with_llm<P>(
        &self,
        pending: Vec<Candidate>,
        content: &str,
        provider: &P,
    ) -> (Vec<(usize, TwoPhaseNugget)>, Vec<Candidate>)
    where
        P: ExtractionProvider + ?Sized,
    {
        let requests: Vec<RawExtraction> = pending.iter().map(|c| c.nugget.clone()).collect();

        let replies = match provider.detect_boundaries(content, &requests).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(error = %e, nuggets = pending.len(), "Boundary detection failed");
                return (Vec::new(), pending);
            }
        };

        let mut located = Vec::new();
        let mut unresolved = Vec::new();
        let mut replies = replies.into_iter();

        for candidate in pending {
            let Some(reply) = replies.next().filter(RawExtraction::is_locatable) else {
                unresolved.push(candidate);
                continue;
            };

            let boundary_confidence = reply.confidence.unwrap_or(candidate.confidence);
            let display = self
                .reconstructor
                .reconstruct_extraction(Some(&reply), Some(content));
            let nugget = RawExtraction {
                nugget_type: candidate.nugget.nugget_type,
                full_content: Some(display.clone()),
                confidence: Some(candidate.confidence),
                ..reply
            };

            located.push((
                candidate.order,
                TwoPhaseNugget {
                    nugget,
                    confidence: candidate.confidence,
                    boundary_confidence,
                    boundary_source: BoundarySource::Llm,
                    span: None,
                    content: display,
                },
            ));
        }

        (located, unresolved)
    }
}
