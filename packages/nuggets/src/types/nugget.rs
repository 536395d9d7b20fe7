//! Nugget types - what providers report and what consensus produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of insight a nugget captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NuggetType {
    /// A tool, library, or product worth trying
    Tool,

    /// A book, talk, video, or article worth consuming
    Media,

    /// A clear explanation of how something works
    Explanation,

    /// An analogy that makes an idea click
    Analogy,

    /// A mental model or framework for thinking
    Model,
}

impl NuggetType {
    /// All nugget types, in prompt order.
    pub const ALL: [NuggetType; 5] = [
        NuggetType::Tool,
        NuggetType::Media,
        NuggetType::Explanation,
        NuggetType::Analogy,
        NuggetType::Model,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            NuggetType::Tool => "tool",
            NuggetType::Media => "media",
            NuggetType::Explanation => "explanation",
            NuggetType::Analogy => "analogy",
            NuggetType::Model => "model",
        }
    }
}

impl fmt::Display for NuggetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a type tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown nugget type: {0}")]
pub struct UnknownNuggetType(pub String);

impl FromStr for NuggetType {
    type Err = UnknownNuggetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        match key.as_str() {
            "tool" | "tools" => Ok(NuggetType::Tool),
            "media" | "resource" => Ok(NuggetType::Media),
            "explanation" | "aha! moments" | "aha moment" | "aha! moment" => {
                Ok(NuggetType::Explanation)
            }
            "analogy" | "analogies" => Ok(NuggetType::Analogy),
            "model" | "mental model" | "mental models" => Ok(NuggetType::Model),
            _ => Err(UnknownNuggetType(s.to_string())),
        }
    }
}

/// A start/end fragment pair used to locate a nugget in its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentPair {
    /// First words of the passage, as reported
    pub start: String,

    /// Last words of the passage, as reported
    pub end: String,
}

impl FragmentPair {
    /// Create a new fragment pair.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Derive a pair from a full passage: its first and last `words` words.
    ///
    /// Short passages yield a start fragment equal to the whole passage, so
    /// the end fragment is contained in it.
    pub fn from_full_content(content: &str, words: usize) -> Self {
        let words = words.max(1);
        let tokens: Vec<&str> = content.split_whitespace().collect();
        if tokens.len() <= words * 2 {
            let tail = tokens.len().saturating_sub(words);
            return Self::new(tokens.join(" "), tokens[tail..].join(" "));
        }
        Self::new(
            tokens[..words].join(" "),
            tokens[tokens.len() - words..].join(" "),
        )
    }

    /// True when either fragment has no visible content.
    pub fn is_blank(&self) -> bool {
        self.start.trim().is_empty() || self.end.trim().is_empty()
    }

    /// The degraded `start...end` rendering used when no span is found.
    pub fn joined(&self) -> String {
        format!("{}...{}", self.start, self.end)
    }
}

/// A single nugget as reported by one provider call.
///
/// Either the fragment pair or the full content is usually present, but
/// neither is guaranteed. Treat every field as untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtraction {
    /// Kind of insight
    #[serde(rename = "type")]
    pub nugget_type: NuggetType,

    /// Reported opening words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_content: Option<String>,

    /// Reported closing words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_content: Option<String>,

    /// Reported full passage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,

    /// Self-reported confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl RawExtraction {
    /// Create a nugget located by a fragment pair.
    pub fn with_fragments(
        nugget_type: NuggetType,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            nugget_type,
            start_content: Some(start.into()),
            end_content: Some(end.into()),
            full_content: None,
            confidence: None,
        }
    }

    /// Create a nugget carrying its full passage.
    pub fn with_full_content(nugget_type: NuggetType, content: impl Into<String>) -> Self {
        Self {
            nugget_type,
            start_content: None,
            end_content: None,
            full_content: Some(content.into()),
            confidence: None,
        }
    }

    /// Set the self-reported confidence (clamped into [0, 1]).
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// The fragment pair, if both fragments carry content.
    pub fn fragment_pair(&self) -> Option<FragmentPair> {
        match (&self.start_content, &self.end_content) {
            (Some(start), Some(end)) if !start.trim().is_empty() && !end.trim().is_empty() => {
                Some(FragmentPair::new(start.clone(), end.clone()))
            }
            _ => None,
        }
    }

    /// Full content, if present and non-blank.
    pub fn full_text(&self) -> Option<&str> {
        self.full_content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
    }

    /// Text used to compare this nugget with others.
    pub fn representative_text(&self) -> String {
        if let Some(full) = self.full_text() {
            return full.to_string();
        }
        let start = self.start_content.as_deref().unwrap_or("");
        let end = self.end_content.as_deref().unwrap_or("");
        format!("{} {}", start, end).trim().to_string()
    }

    /// Whether the nugget carries anything that could be located.
    pub fn is_locatable(&self) -> bool {
        self.fragment_pair().is_some() || self.full_text().is_some()
    }
}

/// A raw extraction tagged with the run that produced it.
#[derive(Debug, Clone)]
pub struct TaggedExtraction {
    /// Zero-based run index within the ensemble
    pub run_id: usize,

    /// Position of the nugget within its run
    pub index: usize,

    /// The reported nugget
    pub extraction: RawExtraction,
}

impl TaggedExtraction {
    /// Tag an extraction with its run.
    pub fn new(run_id: usize, index: usize, extraction: RawExtraction) -> Self {
        Self {
            run_id,
            index,
            extraction,
        }
    }

    /// Synthetic id of the form `run-{run}-{index}`.
    pub fn synthetic_id(&self) -> String {
        format!("run-{}-{}", self.run_id, self.index)
    }
}

/// How fragments were judged to be the same nugget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Embedding cosine similarity
    Embedding,

    /// Lexical overlap, embeddings disabled or unavailable
    #[default]
    WordOverlap,

    /// Lexical overlap after the embedding path failed
    Fallback,
}

/// A deduplicated, confidence-scored nugget produced by consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusNugget {
    /// Canonical representative (first-seen member of the group)
    pub nugget: RawExtraction,

    /// supporting_runs / successful_runs, in (0, 1]
    pub confidence: f32,

    /// Number of distinct runs that reported this nugget
    pub supporting_runs: usize,

    /// Number of runs requested
    pub total_runs: usize,

    /// How the group was formed
    pub similarity_method: SimilarityMethod,

    /// Runs that reported this nugget
    pub run_ids: Vec<usize>,
}

/// Summary statistics for one ensemble extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleMetadata {
    /// Runs requested
    pub total_runs: usize,

    /// Runs that returned a result
    pub successful_runs: usize,

    /// Runs that failed (error or timeout)
    pub failed_runs: usize,

    /// Distinct groups found
    pub consensus_reached: usize,

    /// Fragments merged away (fragments - groups)
    pub duplicates_removed: usize,

    /// Mean wall-clock time of the successful runs
    pub average_response_time_ms: u64,

    /// How groups were formed
    pub similarity_method: SimilarityMethod,
}

/// Output of [`ConsensusBuilder::extract_with_ensemble`](crate::pipeline::consensus::ConsensusBuilder::extract_with_ensemble).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Nuggets sorted by confidence, highest first
    pub nuggets: Vec<ConsensusNugget>,

    /// Run statistics
    pub metadata: EnsembleMetadata,
}
