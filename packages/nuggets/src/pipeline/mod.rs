//! Extraction pipeline - from provider replies to ranked, located nuggets.
//!
//! The pipeline orchestrates:
//! - Reply parsing and validation
//! - Concurrent ensemble runs with per-run failure isolation
//! - Similarity grouping (embeddings, or word overlap as fallback)
//! - Consensus scoring
//! - Two-phase extraction (high recall, confidence filter, boundary detection)

pub mod consensus;
pub mod parse;
pub mod prompts;
pub mod settle;
pub mod similarity;
pub mod two_phase;

pub use consensus::{Consensus, ConsensusBuilder};
pub use parse::{parse_provider_response, ParsedItem, ParsedResponse, RejectReason};
pub use prompts::{
    format_boundary_prompt, format_extract_prompt, format_high_recall_prompt, prompt_hash,
    BOUNDARY_PROMPT, EXTRACT_PROMPT, HIGH_RECALL_PROMPT,
};
pub use settle::{settle_all, Settled};
pub use similarity::{greedy_groups, word_overlap, Grouping, SimilarityMatcher};
pub use two_phase::{
    BoundarySource, TwoPhaseCoordinator, TwoPhaseMetadata, TwoPhaseNugget, TwoPhaseResult,
};
