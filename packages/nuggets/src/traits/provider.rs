//! Provider trait for LLM extraction calls.
//!
//! Implementations wrap a specific vendor (Gemini, Claude, OpenAI, ...) and
//! are responsible for prompting and for turning the vendor's reply into
//! typed [`RawExtraction`]s, typically through
//! [`parse_provider_response`](crate::pipeline::parse::parse_provider_response).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ExtractionError, Result};
use crate::types::nugget::{NuggetType, RawExtraction};

/// LLM extraction collaborator.
///
/// Any error returned from these methods is treated by the core as a single
/// failed call, never as fatal.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str {
        "provider"
    }

    /// Extract nuggets from page content.
    ///
    /// Typically returns fragment pairs (`startContent` / `endContent`).
    async fn extract(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>>;

    /// High-recall extraction for two-phase mode.
    ///
    /// Expected to return `fullContent` with a per-nugget `confidence`.
    async fn extract_high_recall(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        self.extract(content, prompt, temperature, selected_types)
            .await
    }

    /// Ask the model for exact boundaries of nuggets that could not be
    /// located mechanically.
    async fn detect_boundaries(
        &self,
        _content: &str,
        _nuggets: &[RawExtraction],
    ) -> Result<Vec<RawExtraction>> {
        Err(ExtractionError::Unsupported {
            operation: "detect_boundaries",
        })
    }
}

#[async_trait]
impl<P: ExtractionProvider + ?Sized> ExtractionProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn extract(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        (**self)
            .extract(content, prompt, temperature, selected_types)
            .await
    }

    async fn extract_high_recall(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        (**self)
            .extract_high_recall(content, prompt, temperature, selected_types)
            .await
    }

    async fn detect_boundaries(
        &self,
        content: &str,
        nuggets: &[RawExtraction],
    ) -> Result<Vec<RawExtraction>> {
        (**self).detect_boundaries(content, nuggets).await
    }
}
