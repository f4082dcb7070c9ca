//! Triggering the external ingestion workflow and watching for new rows.
//!
//! The webhook answers before the crawl finishes, so success is never
//! confirmed: after triggering, storage stats are polled on a fixed interval
//! until a fixed timeout, and polling then stops whatever the counts say.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tweetmood_core::{AppConfig, ProcessingStats};
use tweetmood_db::{PersistenceGateway, RecordStore};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub polls: u32,
    /// Stats read just before the trigger was sent.
    pub initial: ProcessingStats,
    /// Most recent successful poll, or `initial` if none succeeded.
    pub last: ProcessingStats,
    /// Growth of the raw table over the polling window.
    pub new_records: i64,
    pub cancelled: bool,
}

#[derive(Serialize)]
struct TriggerPayload {
    source: &'static str,
    triggered_at: chrono::DateTime<chrono::Utc>,
}

pub struct IngestionTrigger {
    client: reqwest::Client,
    webhook_url: String,
    poll: PollConfig,
}

impl IngestionTrigger {
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidPollInterval`] for a zero interval and
    /// [`IngestError::Http`] if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>, poll: PollConfig) -> Result<Self, IngestError> {
        if poll.interval.is_zero() {
            return Err(IngestError::InvalidPollInterval);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            poll,
        })
    }

    /// # Errors
    ///
    /// Returns [`IngestError::NotConfigured`] when no webhook URL is set.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, IngestError> {
        let url = config
            .ingest_webhook_url
            .as_deref()
            .ok_or(IngestError::NotConfigured)?;
        Self::new(
            url,
            PollConfig {
                interval: Duration::from_secs(config.ingest_poll_interval_secs),
                timeout: Duration::from_secs(config.ingest_poll_timeout_secs),
            },
        )
    }

    #[must_use]
    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Send the webhook in a detached task. The outcome is only logged.
    pub fn trigger(&self) -> JoinHandle<()> {
        let request = self.client.post(&self.webhook_url).json(&TriggerPayload {
            source: "tweetmood",
            triggered_at: chrono::Utc::now(),
        });
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(status = %response.status(), "ingestion webhook accepted");
                }
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "ingestion webhook rejected");
                }
                Err(e) => tracing::warn!(error = %e, "ingestion webhook request failed"),
            }
        })
    }

    /// Trigger ingestion, then poll stats until the timeout or `cancel`.
    ///
    /// Poll failures are logged and polling continues.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Storage`] if the baseline stats cannot be read;
    /// the webhook is not sent in that case.
    pub async fn trigger_and_poll<S: RecordStore>(
        &self,
        gateway: &PersistenceGateway<S>,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, IngestError> {
        let initial = gateway.fetch_stats().await?;
        drop(self.trigger());

        let started = Instant::now();
        let mut polls = 0u32;
        let mut last = initial;
        let mut cancelled = false;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.poll.timeout {
                break;
            }
            let wait = self.poll.interval.min(self.poll.timeout - elapsed);
            tokio::select! {
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                () = tokio::time::sleep(wait) => {}
            }

            polls += 1;
            match gateway.fetch_stats().await {
                Ok(stats) => {
                    tracing::info!(
                        polls,
                        total = stats.total,
                        new_records = stats.total - initial.total,
                        "ingestion poll"
                    );
                    last = stats;
                }
                Err(e) => tracing::warn!(polls, error = %e, "ingestion poll failed"),
            }
        }

        let outcome = IngestOutcome {
            polls,
            initial,
            last,
            new_records: last.total - initial.total,
            cancelled,
        };
        tracing::info!(
            polls = outcome.polls,
            new_records = outcome.new_records,
            cancelled,
            "ingestion polling finished"
        );
        Ok(outcome)
    }
}
