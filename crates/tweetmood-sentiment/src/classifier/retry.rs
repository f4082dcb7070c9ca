//! Exponential backoff for transient classifier failures.
//!
//! Only network-level failures (connection errors, timeouts) are retried.
//! Remote errors, unavailable models and unparseable bodies are returned
//! immediately so the caller can move on to the next backend.

use std::future::Future;
use std::time::Duration;

use crate::error::ClassifierError;

fn is_retriable(err: &ClassifierError) -> bool {
    matches!(err, ClassifierError::Network(_))
}

/// Runs `operation`, retrying transient failures up to `max_retries` times.
///
/// The sleep before retry `n` (counting from zero) is `backoff_base * 2^n`,
/// so with a one second base and two retries the schedule is 1 s then 2 s.
/// There is no jitter.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base: Duration,
    mut operation: F,
) -> Result<T, ClassifierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifierError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let delay = backoff_base.saturating_mul(1u32 << attempt.min(31));
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient classifier error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    /// A real `reqwest::Error`, produced by a request that cannot be built.
    async fn network_error() -> ClassifierError {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        ClassifierError::Network(err)
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, Duration::ZERO, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ClassifierError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_network_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, Duration::ZERO, || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(network_error().await)
                } else {
                    Ok(1)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<u32, _> = retry_with_backoff(2, Duration::ZERO, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(network_error().await)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ClassifierError::Network(_))));
    }

    #[tokio::test]
    async fn does_not_retry_remote_or_parse_errors() {
        for make in [
            || ClassifierError::RemoteService {
                backend: "primary".to_owned(),
                status: 500,
                message: "boom".to_owned(),
            },
            || ClassifierError::UnrecognizedResponse {
                backend: "primary".to_owned(),
                body: "<html>".to_owned(),
            },
        ] {
            let calls = Arc::new(AtomicU32::new(0));
            let c = Arc::clone(&calls);
            let result: Result<u32, _> = retry_with_backoff(3, Duration::ZERO, || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(make())
                }
            })
            .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_each_attempt() {
        let started = tokio::time::Instant::now();
        let result: Result<u32, _> =
            retry_with_backoff(2, Duration::from_millis(1000), || async {
                Err(network_error().await)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }
}
