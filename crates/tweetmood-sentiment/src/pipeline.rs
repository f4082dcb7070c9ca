//! End-to-end processing run: fetch, filter, classify, map, store.

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tweetmood_core::{AppConfig, ProcessedRecord, ProcessingProgress, ProcessingStats, Stage};
use tweetmood_db::{PersistenceGateway, RecordStore, StorageError};

use crate::batch::BatchOrchestrator;
use crate::classifier::Classify;
use crate::error::PipelineError;
use crate::filter::{filter_recent, FilterOutcome};
use crate::mapper::to_processed_record;

const ANALYZING_START: usize = 30;
const ANALYZING_SPAN: usize = 50;

/// Receives progress snapshots during a run.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &ProcessingProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProcessingProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &ProcessingProgress) {
        self(progress);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Records dated before January 1 of this year are skipped.
    pub cutoff_year: i32,
    /// Page size for unprocessed records. A run keeps paging only while
    /// every record seen so far was dropped.
    pub fetch_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cutoff_year: 2024,
            fetch_limit: 1000,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            cutoff_year: config.cutoff_year,
            fetch_limit: config.fetch_limit,
        }
    }
}

/// What a run did, stage by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: usize,
    pub eligible: usize,
    pub dropped_undated: usize,
    pub dropped_before_cutoff: usize,
    pub dropped_empty: usize,
    pub classified: usize,
    /// Classifications that fell back to the neutral default.
    pub fallback_count: usize,
    pub inserted: u64,
}

pub struct ProcessingPipeline<S, C> {
    gateway: PersistenceGateway<S>,
    orchestrator: BatchOrchestrator<C>,
    config: PipelineConfig,
}

impl<S: RecordStore, C: Classify> ProcessingPipeline<S, C> {
    pub fn new(
        gateway: PersistenceGateway<S>,
        orchestrator: BatchOrchestrator<C>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            orchestrator,
            config,
        }
    }

    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator<C> {
        &self.orchestrator
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if either count fails.
    pub async fn processing_stats(&self) -> Result<ProcessingStats, StorageError> {
        self.gateway.fetch_stats().await
    }

    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn processed_records(
        &self,
        limit: usize,
    ) -> Result<Vec<ProcessedRecord>, StorageError> {
        self.gateway.fetch_processed(limit).await
    }

    /// Run the pipeline once over every unprocessed record.
    ///
    /// # Errors
    ///
    /// See [`process_all_cancellable`](Self::process_all_cancellable).
    pub async fn process_all<O>(&self, observer: &O) -> Result<RunSummary, PipelineError>
    where
        O: ProgressObserver + ?Sized,
    {
        self.process_all_cancellable(observer, &CancellationToken::new())
            .await
    }

    /// Run the pipeline once, stopping at the next chunk boundary if
    /// `cancel` fires.
    ///
    /// 1. Fetch unprocessed records in pages of `fetch_limit`, moving to the
    ///    next page only while every record so far was dropped (10%).
    /// 2. Drop undated, pre-cutoff and empty records (20% to 30%).
    /// 3. Classify the cleaned texts in batches (30% to 80%).
    /// 4. Map results and bulk insert them (90%).
    /// 5. Report completion (100%).
    ///
    /// With nothing eligible the run completes immediately without calling
    /// the classifier. Classifier failures never fail the run: they show up
    /// as fallback results.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] if the fetch or the insert fails and
    /// [`PipelineError::Cancelled`] if the run was cancelled. Either way the
    /// observer sees an `error` stage and nothing is stored.
    pub async fn process_all_cancellable<O>(
        &self,
        observer: &O,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError>
    where
        O: ProgressObserver + ?Sized,
    {
        let mut summary = RunSummary::default();

        emit(observer, Stage::Fetching, 10, "fetching unprocessed records");
        let outcome = self.fetch_eligible(observer, cancel, &mut summary).await?;

        emit(
            observer,
            Stage::Filtering,
            20,
            format!("filtered {} records", summary.fetched),
        );
        summary.eligible = outcome.records.len();
        summary.dropped_undated = outcome.dropped_undated;
        summary.dropped_before_cutoff = outcome.dropped_before_cutoff;
        summary.dropped_empty = outcome.dropped_empty;
        if outcome.dropped_undated > 0 {
            tracing::warn!(
                dropped = outcome.dropped_undated,
                "records dropped for missing or unparseable dates"
            );
        }

        if outcome.records.is_empty() {
            let message = format!(
                "no eligible records to process ({} fetched, {} dropped)",
                summary.fetched,
                outcome.dropped_total()
            );
            tracing::info!(fetched = summary.fetched, "{message}");
            emit(observer, Stage::Completed, 100, message);
            return Ok(summary);
        }

        emit(
            observer,
            Stage::Filtering,
            30,
            format!(
                "{} eligible records ({} dropped, {} with unparseable dates)",
                summary.eligible,
                outcome.dropped_total(),
                outcome.dropped_undated
            ),
        );

        emit(
            observer,
            Stage::Analyzing,
            30,
            format!("classifying {} records", summary.eligible),
        );
        let texts: Vec<&str> = outcome
            .records
            .iter()
            .map(|r| r.cleaned_text.as_str())
            .collect();
        let classified = self
            .orchestrator
            .classify_all_observed(&texts, cancel, |done, total| {
                emit(
                    observer,
                    Stage::Analyzing,
                    analyzing_percent(done, total),
                    format!("classified {done} of {total} records"),
                );
            })
            .await;
        let results = match classified {
            Ok(results) => results,
            Err(cancelled) => {
                tracing::warn!(
                    completed = cancelled.completed.len(),
                    total = summary.eligible,
                    "processing run cancelled, nothing stored"
                );
                observer.on_progress(&ProcessingProgress::failed(
                    analyzing_percent(cancelled.completed.len(), summary.eligible),
                    "processing cancelled",
                    "cancelled",
                ));
                return Err(PipelineError::Cancelled);
            }
        };
        summary.classified = results.len();
        summary.fallback_count = results.iter().filter(|r| r.is_fallback()).count();
        if summary.fallback_count > 0 {
            tracing::warn!(
                fallback_count = summary.fallback_count,
                classified = summary.classified,
                "some records received the neutral fallback"
            );
        }

        emit(
            observer,
            Stage::Storing,
            90,
            format!("storing {} records", results.len()),
        );
        let processed_at = Utc::now();
        let records: Vec<ProcessedRecord> = outcome
            .records
            .iter()
            .zip(results)
            .map(|(cleaned, result)| to_processed_record(cleaned, result, processed_at))
            .collect();
        summary.inserted = match self.gateway.insert_all(&records).await {
            Ok(inserted) => inserted.inserted_count,
            Err(e) => return Err(storage_failure(observer, 90, "failed to store results", e)),
        };

        let message = format!(
            "processed {} records ({} fallback)",
            summary.inserted, summary.fallback_count
        );
        tracing::info!(
            fetched = summary.fetched,
            eligible = summary.eligible,
            inserted = summary.inserted,
            fallback_count = summary.fallback_count,
            "processing run completed"
        );
        emit(observer, Stage::Completed, 100, message);
        Ok(summary)
    }

    /// Page through the unprocessed backlog in id order until a page yields
    /// eligible records or the backlog runs out.
    ///
    /// Dropped records never get a processed row, so they stay in the
    /// backlog; stopping at the first page would let `fetch_limit` stale
    /// rows block every later run.
    async fn fetch_eligible<O>(
        &self,
        observer: &O,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<FilterOutcome, PipelineError>
    where
        O: ProgressObserver + ?Sized,
    {
        let page_size = self.config.fetch_limit.max(1);
        let mut outcome = FilterOutcome::default();
        let mut offset = 0;

        loop {
            let page = match self.gateway.fetch_unprocessed(page_size, offset).await {
                Ok(page) => page,
                Err(e) => return Err(storage_failure(observer, 10, "failed to fetch records", e)),
            };
            summary.fetched += page.records.len();
            outcome.absorb(filter_recent(page.records, self.config.cutoff_year));

            if !outcome.records.is_empty() || page.row_count < page_size {
                return Ok(outcome);
            }

            offset += page.row_count;
            if cancel.is_cancelled() {
                tracing::warn!(scanned = offset, "processing run cancelled while fetching");
                observer.on_progress(&ProcessingProgress::failed(
                    10,
                    "processing cancelled",
                    "cancelled",
                ));
                return Err(PipelineError::Cancelled);
            }
            tracing::debug!(
                scanned = offset,
                "no eligible records yet, fetching the next page"
            );
            emit(
                observer,
                Stage::Fetching,
                10,
                format!("no eligible records in the first {offset} unprocessed, fetching more"),
            );
        }
    }
}

fn emit<O>(observer: &O, stage: Stage, percent: u8, message: impl Into<String>)
where
    O: ProgressObserver + ?Sized,
{
    observer.on_progress(&ProcessingProgress::new(stage, percent, message));
}

fn storage_failure<O>(
    observer: &O,
    percent: u8,
    message: &str,
    error: StorageError,
) -> PipelineError
where
    O: ProgressObserver + ?Sized,
{
    tracing::error!(error = %error, "{message}");
    observer.on_progress(&ProcessingProgress::failed(
        percent,
        message,
        error.to_string(),
    ));
    PipelineError::Storage(error)
}

/// Linear progress across the analyzing stage, from 30% to 80%.
fn analyzing_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return u8::try_from(ANALYZING_START).unwrap_or(u8::MAX);
    }
    let percent = ANALYZING_START + ANALYZING_SPAN * done.min(total) / total;
    u8::try_from(percent).unwrap_or(u8::MAX)
}
