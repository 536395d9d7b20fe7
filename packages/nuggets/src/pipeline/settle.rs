//! Settle-all fan-out.
//!
//! Runs a fixed set of fallible futures concurrently, waits for every one of
//! them, and partitions the outcomes. One failure never cancels the rest.

use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{ExtractionError, Result};

/// Outcomes of a settled fan-out, each tagged with its task index.
#[derive(Debug)]
pub struct Settled<T> {
    pub successes: Vec<(usize, T)>,
    pub failures: Vec<(usize, ExtractionError)>,
}

impl<T> Settled<T> {
    /// Number of tasks that were settled.
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn all_failed(&self) -> bool {
        self.successes.is_empty()
    }
}

impl<T> Default for Settled<T> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Await all `tasks` and partition successes from failures.
///
/// Both lists keep task order.
pub async fn settle_all<I, F, T>(tasks: I) -> Settled<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    let results = join_all(tasks).await;

    let mut settled = Settled::default();
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => settled.successes.push((idx, value)),
            Err(e) => settled.failures.push((idx, e)),
        }
    }
    settled
}

/// Await `future` and measure its wall-clock time.
pub async fn timed<F: Future>(future: F) -> (F::Output, Duration) {
    let started = Instant::now();
    let output = future.await;
    (output, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_all_partitions_in_order() {
        let tasks = (0..4).map(|i| async move {
            if i % 2 == 0 {
                Ok(i * 10)
            } else {
                Err(ExtractionError::provider(format!("task {i} failed")))
            }
        });

        let settled = settle_all(tasks).await;
        assert_eq!(settled.successes, vec![(0, 0), (2, 20)]);
        assert_eq!(
            settled.failures.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(settled.total(), 4);
        assert!(!settled.all_failed());
    }

    #[tokio::test]
    async fn test_settle_all_empty() {
        let settled = settle_all(Vec::<std::future::Ready<Result<u8>>>::new()).await;
        assert_eq!(settled.total(), 0);
        assert!(settled.all_failed());
    }

    #[tokio::test]
    async fn test_timed() {
        let (value, elapsed) = timed(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            7
        })
        .await;
        assert_eq!(value, 7);
        assert!(elapsed >= Duration::from_millis(5));
    }
}
