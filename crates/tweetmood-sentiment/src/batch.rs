//! Bounded-concurrency batch classification.
//!
//! Texts are split into batches of `batch_size`; each batch is split into
//! chunks of at most `max_concurrent` texts classified together. The output
//! always has one result per input, in input order.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tweetmood_core::{AppConfig, SentimentResult};

use crate::classifier::Classify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrent: usize,
    /// Pause between chunks within a batch.
    pub chunk_delay: Duration,
    /// Pause between batches.
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent: 3,
            chunk_delay: Duration::from_millis(500),
            batch_delay: Duration::from_millis(1000),
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrent: config.max_concurrent,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }

    /// Same sizes with no pacing, for tests and local runs.
    #[must_use]
    pub fn without_delays(self) -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            ..self
        }
    }
}

/// Returned when a run is cancelled at a chunk boundary.
#[derive(Debug)]
pub struct BatchCancelled {
    /// Results for the texts classified before cancellation, in input order.
    pub completed: Vec<SentimentResult>,
}

pub struct BatchOrchestrator<C> {
    classifier: C,
    config: BatchConfig,
}

impl<C: Classify> BatchOrchestrator<C> {
    /// Zero sizes are raised to one.
    pub fn new(classifier: C, config: BatchConfig) -> Self {
        Self {
            classifier,
            config: BatchConfig {
                batch_size: config.batch_size.max(1),
                max_concurrent: config.max_concurrent.max(1),
                ..config
            },
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Classify every text. Never fails and never drops an item.
    pub async fn classify_all<T>(&self, texts: &[T]) -> Vec<SentimentResult>
    where
        T: AsRef<str> + Sync,
    {
        // Without a token the run cannot be cancelled.
        self.run(texts, None, |_, _| {})
            .await
            .unwrap_or_else(|cancelled| cancelled.completed)
    }

    /// Like [`classify_all`](Self::classify_all), reporting `(done, total)`
    /// after every chunk and checking `cancel` before each one.
    ///
    /// # Errors
    ///
    /// Returns [`BatchCancelled`] with the results gathered so far if `cancel`
    /// fires before the last chunk starts.
    pub async fn classify_all_observed<T, F>(
        &self,
        texts: &[T],
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<Vec<SentimentResult>, BatchCancelled>
    where
        T: AsRef<str> + Sync,
        F: FnMut(usize, usize) + Send,
    {
        self.run(texts, Some(cancel), on_progress).await
    }

    async fn run<T, F>(
        &self,
        texts: &[T],
        cancel: Option<&CancellationToken>,
        mut on_progress: F,
    ) -> Result<Vec<SentimentResult>, BatchCancelled>
    where
        T: AsRef<str> + Sync,
        F: FnMut(usize, usize) + Send,
    {
        let total = texts.len();
        let mut results = Vec::with_capacity(total);
        let batch_count = total.div_ceil(self.config.batch_size);

        for (batch_index, batch) in texts.chunks(self.config.batch_size).enumerate() {
            let chunk_count = batch.len().div_ceil(self.config.max_concurrent);

            for (chunk_index, chunk) in batch.chunks(self.config.max_concurrent).enumerate() {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    tracing::warn!(
                        completed = results.len(),
                        total,
                        "batch classification cancelled"
                    );
                    return Err(BatchCancelled { completed: results });
                }

                let chunk_results =
                    join_all(chunk.iter().map(|text| self.classify_guarded(text.as_ref()))).await;
                results.extend(chunk_results);
                on_progress(results.len(), total);

                if chunk_index + 1 < chunk_count {
                    pause(self.config.chunk_delay).await;
                }
            }

            tracing::debug!(
                batch = batch_index + 1,
                batch_count,
                completed = results.len(),
                total,
                "batch classified"
            );
            if batch_index + 1 < batch_count {
                pause(self.config.batch_delay).await;
            }
        }

        Ok(results)
    }

    async fn classify_guarded(&self, text: &str) -> SentimentResult {
        match AssertUnwindSafe(self.classifier.classify(text))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("classifier panicked, using neutral fallback");
                self.classifier.fallback()
            }
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tweetmood_core::Sentiment;

    use super::*;

    /// Echoes the input as the label after a delay that shrinks with the
    /// number in the text, so later items finish first.
    struct ReverseLatency;

    #[async_trait]
    impl Classify for ReverseLatency {
        async fn classify(&self, text: &str) -> SentimentResult {
            let n: u64 = text.trim_start_matches('t').parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 3))).await;
            SentimentResult::from_score(Sentiment::Positive, text, 0.6)
        }
    }

    struct AlwaysFallback;

    #[async_trait]
    impl Classify for AlwaysFallback {
        async fn classify(&self, _text: &str) -> SentimentResult {
            self.fallback()
        }
    }

    /// Panics on every text containing "boom".
    struct Explosive;

    #[async_trait]
    impl Classify for Explosive {
        async fn classify(&self, text: &str) -> SentimentResult {
            assert!(!text.contains("boom"), "classifier blew up");
            SentimentResult::from_score(Sentiment::Neutral, "neutral", 0.5)
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classify for Counting {
        async fn classify(&self, _text: &str) -> SentimentResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SentimentResult::from_score(Sentiment::Neutral, "neutral", 0.5)
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    fn fast(batch_size: usize, max_concurrent: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            max_concurrent,
            ..BatchConfig::default()
        }
        .without_delays()
    }

    #[tokio::test]
    async fn output_order_matches_input_despite_completion_order() {
        let orchestrator = BatchOrchestrator::new(ReverseLatency, fast(5, 5));
        let input = texts(12);
        let results = orchestrator.classify_all(&input).await;
        let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, input.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn always_failing_classifier_still_yields_one_result_per_input() {
        let orchestrator = BatchOrchestrator::new(AlwaysFallback, fast(4, 2));
        let results = orchestrator.classify_all(&texts(9)).await;
        assert_eq!(results.len(), 9);
        assert!(results.iter().all(SentimentResult::is_fallback));
    }

    #[tokio::test]
    async fn panicking_classifier_is_replaced_by_fallback() {
        let orchestrator = BatchOrchestrator::new(Explosive, fast(3, 3));
        let results = orchestrator
            .classify_all(&["fine", "boom", "also fine"])
            .await;
        assert_eq!(results.len(), 3);
        assert!(!results[0].is_fallback());
        assert!(results[1].is_fallback());
        assert_eq!(results[1].sentiment, Sentiment::Neutral);
        assert!(!results[2].is_fallback());
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let orchestrator = BatchOrchestrator::new(Counting::default(), fast(3, 3));
        let results = orchestrator.classify_all::<String>(&[]).await;
        assert!(results.is_empty());
        assert_eq!(orchestrator.classifier().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_sizes_are_raised_to_one() {
        let orchestrator = BatchOrchestrator::new(Counting::default(), fast(0, 0));
        assert_eq!(orchestrator.config().batch_size, 1);
        assert_eq!(orchestrator.config().max_concurrent, 1);
        assert_eq!(orchestrator.classify_all(&texts(3)).await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_are_skipped_after_final_chunk_and_batch() {
        let config = BatchConfig {
            batch_size: 5,
            max_concurrent: 3,
            chunk_delay: Duration::from_millis(100),
            batch_delay: Duration::from_millis(1000),
        };
        let orchestrator = BatchOrchestrator::new(Counting::default(), config);
        let started = tokio::time::Instant::now();
        orchestrator.classify_all(&texts(10)).await;
        // Two batches of two chunks each: one chunk pause per batch plus one
        // batch pause.
        assert_eq!(started.elapsed(), Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn progress_is_reported_after_every_chunk() {
        let orchestrator = BatchOrchestrator::new(Counting::default(), fast(4, 2));
        let mut seen = Vec::new();
        let results = orchestrator
            .classify_all_observed(&texts(7), &CancellationToken::new(), |done, total| {
                seen.push((done, total));
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 7);
        assert_eq!(seen, vec![(2, 7), (4, 7), (6, 7), (7, 7)]);
    }

    #[tokio::test]
    async fn cancellation_stops_at_next_chunk_boundary() {
        let orchestrator = BatchOrchestrator::new(Counting::default(), fast(10, 2));
        let cancel = CancellationToken::new();
        let outcome = orchestrator
            .classify_all_observed(&texts(10), &cancel, |done, _| {
                if done >= 4 {
                    cancel.cancel();
                }
            })
            .await;
        let cancelled = outcome.unwrap_err();
        assert_eq!(cancelled.completed.len(), 4);
        assert_eq!(orchestrator.classifier().calls.load(Ordering::SeqCst), 4);
    }
}
