//! Typed errors for the nuggets library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Most failure modes in this crate are *not* errors: a boundary that cannot
//! be located is a [`MatchResult::Failure`](crate::types::span::MatchResult),
//! and a failed ensemble run contributes an empty result. The errors below
//! are what collaborators (providers, embedders, parsers) report.

use thiserror::Error;

/// Errors that can occur at the collaborator boundary.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Provider call failed (transport, vendor error, etc.)
    #[error("provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider call exceeded its time budget
    #[error("provider call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Provider returned a response with an unusable shape
    #[error("invalid provider response: {reason}")]
    InvalidResponse { reason: String },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Collaborator does not implement an optional operation
    #[error("operation not supported: {operation}")]
    Unsupported { operation: &'static str },
}

impl ExtractionError {
    /// Wrap any error as a provider failure.
    pub fn provider(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Provider(err.into())
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Timeout { .. })
    }
}

/// Result type alias for nuggets operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;
