//! Span types - where a fragment pair landed in the source text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tier of the boundary matcher produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Substring hit after normalization
    Exact,

    /// Located through unchanged diff segments
    Diff,

    /// Located through word-window similarity
    Fuzzy,

    /// No strategy matched
    None,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::Diff => "diff",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::None => "none",
        };
        f.write_str(name)
    }
}

/// A located passage, in original-text coordinates.
///
/// `start_index` and `end_index` are byte offsets into the original text and
/// always fall on char boundaries. For a successful match
/// `start_index < end_index <= original.len()` and `matched_text` is exactly
/// `original[start_index..end_index]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSpan {
    pub start_index: usize,
    pub end_index: usize,
    pub matched_text: String,
    pub strategy: MatchStrategy,
    pub confidence: f32,
}

impl NormalizedSpan {
    /// Build a span by slicing `original`.
    ///
    /// Returns `None` if the range is empty, out of bounds, or not on char
    /// boundaries.
    pub fn from_original(
        original: &str,
        start_index: usize,
        end_index: usize,
        strategy: MatchStrategy,
        confidence: f32,
    ) -> Option<Self> {
        if start_index >= end_index {
            return None;
        }
        let matched_text = original.get(start_index..end_index)?.to_string();
        Some(Self {
            start_index,
            end_index,
            matched_text,
            strategy,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    /// Never true for spans built through [`NormalizedSpan::from_original`].
    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }
}

/// Why a fragment pair could not be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum NoBoundary {
    #[error("start content is empty")]
    EmptyStart,

    #[error("end content is empty")]
    EmptyEnd,

    #[error("source text is empty")]
    EmptySource,

    #[error("start content not found")]
    StartNotFound,

    #[error("end content not found after start")]
    EndNotFoundAfterStart,

    #[error("located span collapsed to nothing")]
    SpanCollapsed,
}

/// Outcome of one boundary search. Always exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MatchResult {
    Success(NormalizedSpan),
    Failure { reason: NoBoundary },
}

impl MatchResult {
    /// Create a failure.
    pub fn failure(reason: NoBoundary) -> Self {
        Self::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The located span, if any.
    pub fn span(&self) -> Option<&NormalizedSpan> {
        match self {
            Self::Success(span) => Some(span),
            Self::Failure { .. } => None,
        }
    }

    /// Strategy that produced the match (`None` on failure).
    pub fn strategy(&self) -> MatchStrategy {
        self.span().map_or(MatchStrategy::None, |span| span.strategy)
    }

    /// Match confidence (0.0 on failure).
    pub fn confidence(&self) -> f32 {
        self.span().map_or(0.0, |span| span.confidence)
    }

    /// Matched original text, if any.
    pub fn matched_text(&self) -> Option<&str> {
        self.span().map(|span| span.matched_text.as_str())
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<NoBoundary> {
        match self {
            Self::Success(_) => None,
            Self::Failure { reason } => Some(*reason),
        }
    }
}
