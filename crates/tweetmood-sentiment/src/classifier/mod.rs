//! HTTP sentiment classifier with retry and backend failover.

mod labels;
mod response;
mod retry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tweetmood_core::{AppConfig, SentimentResult};

use crate::error::ClassifierError;
use crate::filter::{truncate_chars, MAX_CLEANED_CHARS};

pub use labels::{map_label, LabelThresholds};

/// Text sent by [`SentimentClassifierClient::warm_up`].
const WARM_UP_TEXT: &str = "warming up the sentiment model";

/// Something that can label a piece of text.
///
/// `classify` never fails: implementations log whatever went wrong and
/// answer with [`Classify::fallback`] instead.
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, text: &str) -> SentimentResult;

    /// The neutral result substituted when classification cannot complete.
    fn fallback(&self) -> SentimentResult {
        SentimentResult::fallback("classifier")
    }
}

#[async_trait]
impl<T: Classify + ?Sized> Classify for Arc<T> {
    async fn classify(&self, text: &str) -> SentimentResult {
        (**self).classify(text).await
    }

    fn fallback(&self) -> SentimentResult {
        (**self).fallback()
    }
}

/// A named inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    pub url: String,
}

impl Backend {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub primary: Backend,
    pub secondary: Option<Backend>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub thresholds: LabelThresholds,
}

impl ClassifierConfig {
    /// Defaults for everything but the primary backend.
    #[must_use]
    pub fn new(primary: Backend) -> Self {
        Self {
            primary,
            secondary: None,
            token: None,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_base: Duration::from_millis(1000),
            thresholds: LabelThresholds::default(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            primary: Backend::new(
                &config.classifier_primary_name,
                &config.classifier_primary_url,
            ),
            secondary: config
                .classifier_secondary_url
                .as_ref()
                .map(|url| Backend::new(&config.classifier_secondary_name, url)),
            token: config.classifier_token.clone(),
            timeout: Duration::from_secs(config.classifier_timeout_secs),
            max_retries: config.classifier_max_retries,
            backoff_base: Duration::from_millis(config.classifier_backoff_base_ms),
            thresholds: LabelThresholds {
                strong: config.strong_sentiment_threshold,
                neutral_promotion: config.neutral_promotion_threshold,
            },
        }
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Classifier backed by one or two hosted inference endpoints.
///
/// Each call tries the preferred backend first and the other one second.
/// [`warm_up`](Self::warm_up) decides which backend is preferred.
pub struct SentimentClassifierClient {
    client: reqwest::Client,
    config: ClassifierConfig,
    prefer_secondary: AtomicBool,
}

impl SentimentClassifierClient {
    /// # Errors
    ///
    /// Returns [`ClassifierError::Validation`] for a zero timeout and
    /// [`ClassifierError::Network`] if the HTTP client cannot be built.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        if config.timeout.is_zero() {
            return Err(ClassifierError::Validation(
                "classifier timeout must be greater than zero".to_owned(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tweetmood/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            prefer_secondary: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    #[must_use]
    pub fn prefers_secondary(&self) -> bool {
        self.prefer_secondary.load(Ordering::Relaxed)
    }

    /// Warm up the primary backend and, if it fails, the secondary.
    ///
    /// Later calls start with whichever backend answered. When neither
    /// answers the primary stays preferred. Returns the preferred backend.
    pub async fn warm_up(&self) -> &Backend {
        let primary = &self.config.primary;
        let Some(secondary) = &self.config.secondary else {
            return primary;
        };

        let prefer_secondary = match self.classify_with(primary, WARM_UP_TEXT).await {
            Ok(_) => {
                tracing::info!(backend = %primary.name, "primary classifier is ready");
                false
            }
            Err(primary_err) => match self.classify_with(secondary, WARM_UP_TEXT).await {
                Ok(_) => {
                    tracing::warn!(
                        primary = %primary.name,
                        secondary = %secondary.name,
                        error = %primary_err,
                        "primary classifier unavailable, preferring secondary"
                    );
                    true
                }
                Err(secondary_err) => {
                    tracing::warn!(
                        primary_error = %primary_err,
                        secondary_error = %secondary_err,
                        "no classifier backend answered warm-up"
                    );
                    false
                }
            },
        };

        self.prefer_secondary.store(prefer_secondary, Ordering::Relaxed);
        if prefer_secondary {
            secondary
        } else {
            primary
        }
    }

    /// Classify `text`, surfacing the last backend's error if every backend fails.
    ///
    /// Input longer than the cleaning limit is truncated before sending.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Validation`] for empty input without making
    /// a request, otherwise the error from the last backend tried.
    pub async fn try_classify(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        let text = truncate_chars(text.trim(), MAX_CLEANED_CHARS);
        if text.is_empty() {
            return Err(ClassifierError::Validation("text is empty".to_owned()));
        }

        let mut last_err = None;
        for backend in self.backend_order() {
            match self.classify_with(backend, text).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if matches!(err, ClassifierError::ModelUnavailable { .. }) {
                        tracing::warn!(
                            backend = %backend.name,
                            error = %err,
                            "classifier model unavailable, trying next backend"
                        );
                    } else {
                        tracing::warn!(
                            backend = %backend.name,
                            error = %err,
                            "classifier backend failed"
                        );
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ClassifierError::Validation("no classifier backend".to_owned())))
    }

    fn backend_order(&self) -> Vec<&Backend> {
        let primary = &self.config.primary;
        match &self.config.secondary {
            None => vec![primary],
            Some(secondary) if self.prefers_secondary() => vec![secondary, primary],
            Some(secondary) => vec![primary, secondary],
        }
    }

    async fn classify_with(
        &self,
        backend: &Backend,
        text: &str,
    ) -> Result<SentimentResult, ClassifierError> {
        retry::retry_with_backoff(self.config.max_retries, self.config.backoff_base, || {
            self.request_once(backend, text)
        })
        .await
    }

    async fn request_once(
        &self,
        backend: &Backend,
        text: &str,
    ) -> Result<SentimentResult, ClassifierError> {
        let body = ClassifyRequest {
            inputs: text,
            options: RequestOptions {
                wait_for_model: true,
            },
        };
        let mut request = self.client.post(&backend.url).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(response::remote_error(
                &backend.name,
                status.as_u16(),
                response::error_message(&body),
            ));
        }

        let prediction = response::best_prediction(&backend.name, &body)?;
        let result = map_label(&prediction.label, prediction.score, &self.config.thresholds);
        tracing::debug!(
            backend = %backend.name,
            label = %prediction.label,
            score = prediction.score,
            sentiment = %result.sentiment,
            "text classified"
        );
        Ok(result)
    }
}

#[async_trait]
impl Classify for SentimentClassifierClient {
    async fn classify(&self, text: &str) -> SentimentResult {
        match self.try_classify(text).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "classification failed, using neutral fallback");
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> SentimentResult {
        SentimentResult::fallback(&self.config.primary.name)
    }
}
