//! Timeout and retry wrapper for extraction providers.
//!
//! Wraps any provider so that each attempt gets a time budget and transient
//! failures are retried with exponential backoff. A failure that survives
//! the retries still surfaces as one failed call.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{ExtractionError, Result};
use crate::traits::provider::ExtractionProvider;
use crate::types::config::RetryConfig;
use crate::types::nugget::{NuggetType, RawExtraction};

/// A provider wrapper that enforces timeouts and retries transient errors.
///
/// Only [`ExtractionError::is_retryable`] errors are retried; malformed
/// replies and unsupported operations fail immediately.
pub struct ResilientProvider<P: ExtractionProvider> {
    inner: P,
    retry: RetryConfig,
}

impl<P: ExtractionProvider> ResilientProvider<P> {
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: P, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// One attempt, bounded by the per-attempt timeout (0 = unbounded).
    async fn attempt<T, Fut>(&self, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if self.retry.timeout_ms == 0 {
            return call.await;
        }

        match tokio::time::timeout(Duration::from_millis(self.retry.timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout {
                after_ms: self.retry.timeout_ms,
            }),
        }
    }

    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay_ms = self.retry.backoff_ms(attempt);
                    warn!(
                        provider = self.inner.name(),
                        operation,
                        attempt = attempt + 1,
                        delay_ms,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: ExtractionProvider> ExtractionProvider for ResilientProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn extract(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        self.with_retries("extract", || {
            self.inner
                .extract(content, prompt, temperature, selected_types)
        })
        .await
    }

    async fn extract_high_recall(
        &self,
        content: &str,
        prompt: &str,
        temperature: Option<f32>,
        selected_types: Option<&[NuggetType]>,
    ) -> Result<Vec<RawExtraction>> {
        self.with_retries("extract_high_recall", || {
            self.inner
                .extract_high_recall(content, prompt, temperature, selected_types)
        })
        .await
    }

    async fn detect_boundaries(
        &self,
        content: &str,
        nuggets: &[RawExtraction],
    ) -> Result<Vec<RawExtraction>> {
        self.with_retries("detect_boundaries", || {
            self.inner.detect_boundaries(content, nuggets)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, MockRun};

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(max_retries)
            .with_base_delay_ms(1)
            .with_timeout_ms(1_000)
    }

    fn nugget() -> RawExtraction {
        RawExtraction::with_fragments(NuggetType::Tool, "Use ripgrep", "fast")
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider = ResilientProvider::new(
            MockProvider::new()
                .with_failure("503")
                .with_run(vec![nugget()]),
            fast_retries(2),
        );

        let nuggets = provider.extract("c", "p", None, None).await.unwrap();
        assert_eq!(nuggets, vec![nugget()]);
        assert_eq!(provider.inner().call_count(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let provider = ResilientProvider::new(
            MockProvider::new()
                .with_failure("503")
                .with_failure("503")
                .with_failure("503")
                .with_run(vec![nugget()]),
            fast_retries(2),
        );

        let err = provider.extract("c", "p", None, None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Provider(_)));
        assert_eq!(provider.inner().call_count(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_is_not_retried() {
        let provider = ResilientProvider::new(MockProvider::new(), fast_retries(3));

        let err = provider.detect_boundaries("c", &[nugget()]).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported { .. }));
        assert_eq!(provider.inner().call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let provider = ResilientProvider::new(
            MockProvider::new()
                .with_scripted(MockRun::ok(vec![nugget()]).after(Duration::from_millis(500)))
                .with_scripted(MockRun::ok(vec![nugget()]).after(Duration::from_millis(500))),
            fast_retries(1).with_timeout_ms(20),
        );

        let err = provider
            .extract_high_recall("c", "p", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout { after_ms: 20 }));
        assert_eq!(provider.inner().call_count(), 2);
        assert_eq!(provider.name(), "mock");
    }
}
