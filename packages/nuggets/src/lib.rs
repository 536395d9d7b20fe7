//! Nugget Relocation and Consensus Library
//!
//! LLMs asked to pull "golden nuggets" out of a web page report them as short
//! start/end quotes, and those quotes drift: curly quotes become straight,
//! whitespace collapses, words get paraphrased. A single run also misses
//! real nuggets and invents weak ones. This library handles both problems.
//!
//! # Design Philosophy
//!
//! **"Locate what the model meant, trust what the runs agree on"**
//!
//! - Offsets always refer to the original page text, never a normalized copy
//! - Unlocatable fragments are a result, not an error
//! - Failed provider runs are isolated, never fatal
//! - Library handles mechanics, app handles vendors
//!
//! # Usage
//!
//! ```rust,ignore
//! use nuggets::{BoundaryMatcher, ConsensusBuilder, EnsembleOptions, FragmentPair};
//! use nuggets::testing::MockProvider;
//!
//! // Locate a reported passage in the page
//! let matcher = BoundaryMatcher::default();
//! let result = matcher.find_boundary(&FragmentPair::new("How do we", "observations?"), &page);
//!
//! // Reconcile three concurrent runs
//! let provider = MockProvider::new();
//! let ensemble = ConsensusBuilder::default()
//!     .extract_with_ensemble(&page, &prompt, &provider, &EnsembleOptions::default())
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (ExtractionProvider, Embedder)
//! - [`types`] - Nugget, span, and configuration types
//! - [`matching`] - Normalization, position mapping, boundary matching
//! - [`pipeline`] - Parsing, similarity grouping, consensus, two-phase extraction
//! - [`cache`] - Bounded embedding cache
//! - [`providers`] - Provider wrappers (timeouts and retries)
//! - [`testing`] - Mock implementations for testing

pub mod cache;
pub mod error;
pub mod matching;
pub mod pipeline;
pub mod providers;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use cache::{CacheStats, EmbeddingCache};
pub use error::{ExtractionError, Result};
pub use matching::{normalize, BoundaryMatcher, ContentReconstructor, PositionMap, PositionMapCache};
pub use pipeline::{
    parse_provider_response, BoundarySource, ConsensusBuilder, SimilarityMatcher,
    TwoPhaseCoordinator, TwoPhaseMetadata, TwoPhaseNugget, TwoPhaseResult,
};
pub use providers::ResilientProvider;
pub use traits::{
    embedder::{EmbedOptions, Embedder, EmbeddingTask},
    provider::ExtractionProvider,
};
pub use types::{
    config::{
        BoundaryConfig, CacheConfig, EnsembleOptions, EvictionPolicy, ExtractionMode,
        NuggetConfig, RetryConfig, SimilarityOptions, TwoPhaseOptions,
    },
    nugget::{
        ConsensusNugget, EnsembleMetadata, EnsembleResult, FragmentPair, NuggetType,
        RawExtraction, SimilarityMethod, TaggedExtraction,
    },
    span::{MatchResult, MatchStrategy, NoBoundary, NormalizedSpan},
};
