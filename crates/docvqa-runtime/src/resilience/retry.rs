//! Exponential backoff for transient provider errors.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::config::RetrySettings;
use crate::providers::ProviderError;

/// Run `operation`, retrying while it fails with a transient error.
///
/// `settings.max_attempts` counts the first call. Non-transient errors are
/// returned immediately.
pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    label: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(settings.min_delay)
        .with_max_delay(settings.max_delay)
        .with_max_times(settings.max_attempts.saturating_sub(1));

    operation
        .retry(backoff)
        .when(ProviderError::is_transient)
        .notify(|error: &ProviderError, delay: Duration| {
            tracing::warn!(operation = label, error = %error, delay = ?delay, "Transient failure, retrying");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetrySettings {
        RetrySettings {
            max_attempts,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&fast(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Timeout(Duration::from_secs(1)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&fast(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::HttpError("reset".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::HttpError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&fast(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::AuthError) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::AuthError)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
