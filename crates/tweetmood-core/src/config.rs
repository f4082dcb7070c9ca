use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_PRIMARY_NAME: &str = "twitter-roberta";
const DEFAULT_PRIMARY_URL: &str = "https://api-inference.huggingface.co/models/cardiffnlp/twitter-roberta-base-sentiment-latest";
const DEFAULT_SECONDARY_NAME: &str = "distilbert-sst2";
const DEFAULT_SECONDARY_URL: &str = "https://api-inference.huggingface.co/models/distilbert/distilbert-base-uncased-finetuned-sst-2-english";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files. Use it when
/// the caller manages the environment itself.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a `HashMap`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_nonzero_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let value = parse_u64(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let parse_nonzero_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let parse_unit_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(var, format!("{value} is outside [0, 1]")));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("TWEETMOOD_ENV", "development"))?;
    let bind_addr = parse_addr("TWEETMOOD_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("TWEETMOOD_LOG_LEVEL", "info");
    let api_keys = or_default("TWEETMOOD_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let raw_table = or_default("TWEETMOOD_RAW_TABLE", "tweets");
    let processed_table = or_default("TWEETMOOD_PROCESSED_TABLE", "processed_tweets");
    let db_max_connections = parse_u32("TWEETMOOD_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TWEETMOOD_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TWEETMOOD_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let classifier_token = optional("TWEETMOOD_CLASSIFIER_TOKEN");
    let classifier_primary_name =
        or_default("TWEETMOOD_CLASSIFIER_PRIMARY_NAME", DEFAULT_PRIMARY_NAME);
    let classifier_primary_url =
        or_default("TWEETMOOD_CLASSIFIER_PRIMARY_URL", DEFAULT_PRIMARY_URL);
    let classifier_secondary_name =
        or_default("TWEETMOOD_CLASSIFIER_SECONDARY_NAME", DEFAULT_SECONDARY_NAME);
    // Present-but-empty disables the secondary backend; absent uses the default.
    let classifier_secondary_url = match lookup("TWEETMOOD_CLASSIFIER_SECONDARY_URL") {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().to_string()),
        Err(_) => Some(DEFAULT_SECONDARY_URL.to_string()),
    };
    let classifier_timeout_secs = parse_nonzero_u64("TWEETMOOD_CLASSIFIER_TIMEOUT_SECS", "30")?;
    let classifier_max_retries = parse_u32("TWEETMOOD_CLASSIFIER_MAX_RETRIES", "2")?;
    let classifier_backoff_base_ms = parse_u64("TWEETMOOD_CLASSIFIER_BACKOFF_BASE_MS", "1000")?;
    let strong_sentiment_threshold =
        parse_unit_f64("TWEETMOOD_STRONG_SENTIMENT_THRESHOLD", "0.8")?;
    let neutral_promotion_threshold =
        parse_unit_f64("TWEETMOOD_NEUTRAL_PROMOTION_THRESHOLD", "0.72")?;

    let batch_size = parse_nonzero_usize("TWEETMOOD_BATCH_SIZE", "10")?;
    let max_concurrent = parse_nonzero_usize("TWEETMOOD_MAX_CONCURRENT", "3")?;
    let chunk_delay_ms = parse_u64("TWEETMOOD_CHUNK_DELAY_MS", "500")?;
    let batch_delay_ms = parse_u64("TWEETMOOD_BATCH_DELAY_MS", "1000")?;
    let fetch_limit = parse_nonzero_usize("TWEETMOOD_FETCH_LIMIT", "1000")?;
    let cutoff_year = or_default("TWEETMOOD_CUTOFF_YEAR", "2024")
        .parse::<i32>()
        .map_err(|e| invalid("TWEETMOOD_CUTOFF_YEAR", e.to_string()))?;

    let ingest_webhook_url = optional("TWEETMOOD_INGEST_WEBHOOK_URL");
    let ingest_poll_interval_secs = parse_nonzero_u64("TWEETMOOD_INGEST_POLL_INTERVAL_SECS", "10")?;
    let ingest_poll_timeout_secs = parse_u64("TWEETMOOD_INGEST_POLL_TIMEOUT_SECS", "180")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_keys,
        raw_table,
        processed_table,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        classifier_token,
        classifier_primary_name,
        classifier_primary_url,
        classifier_secondary_name,
        classifier_secondary_url,
        classifier_timeout_secs,
        classifier_max_retries,
        classifier_backoff_base_ms,
        strong_sentiment_threshold,
        neutral_promotion_threshold,
        batch_size,
        max_concurrent,
        chunk_delay_ms,
        batch_delay_ms,
        fetch_limit,
        cutoff_year,
        ingest_webhook_url,
        ingest_poll_interval_secs,
        ingest_poll_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TWEETMOOD_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
