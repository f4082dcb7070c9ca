use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Fully resolved application configuration.
///
/// Built by [`crate::load_app_config`]. Secrets are redacted from the
/// `Debug` output.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub api_keys: Vec<String>,

    pub raw_table: String,
    pub processed_table: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub classifier_token: Option<String>,
    pub classifier_primary_name: String,
    pub classifier_primary_url: String,
    pub classifier_secondary_name: String,
    /// `None` disables the secondary backend.
    pub classifier_secondary_url: Option<String>,
    pub classifier_timeout_secs: u64,
    pub classifier_max_retries: u32,
    pub classifier_backoff_base_ms: u64,
    pub strong_sentiment_threshold: f64,
    pub neutral_promotion_threshold: f64,

    pub batch_size: usize,
    pub max_concurrent: usize,
    pub chunk_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub fetch_limit: usize,
    pub cutoff_year: i32,

    pub ingest_webhook_url: Option<String>,
    pub ingest_poll_interval_secs: u64,
    pub ingest_poll_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("raw_table", &self.raw_table)
            .field("processed_table", &self.processed_table)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "classifier_token",
                &self.classifier_token.as_ref().map(|_| "[redacted]"),
            )
            .field("classifier_primary_name", &self.classifier_primary_name)
            .field("classifier_primary_url", &self.classifier_primary_url)
            .field("classifier_secondary_name", &self.classifier_secondary_name)
            .field("classifier_secondary_url", &self.classifier_secondary_url)
            .field("classifier_timeout_secs", &self.classifier_timeout_secs)
            .field("classifier_max_retries", &self.classifier_max_retries)
            .field(
                "classifier_backoff_base_ms",
                &self.classifier_backoff_base_ms,
            )
            .field(
                "strong_sentiment_threshold",
                &self.strong_sentiment_threshold,
            )
            .field(
                "neutral_promotion_threshold",
                &self.neutral_promotion_threshold,
            )
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .field("batch_delay_ms", &self.batch_delay_ms)
            .field("fetch_limit", &self.fetch_limit)
            .field("cutoff_year", &self.cutoff_year)
            .field(
                "ingest_webhook_url",
                &self.ingest_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("ingest_poll_interval_secs", &self.ingest_poll_interval_secs)
            .field("ingest_poll_timeout_secs", &self.ingest_poll_timeout_secs)
            .finish()
    }
}
