use backoff::{ExponentialBackoff, future::retry};
use crate::error::{StreamError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on how long the startup connection check keeps retrying.
pub const MAX_CONNECT_ELAPSED: Duration = Duration::from_secs(30);

pub async fn execute_with_retry<F, Fut, T>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, backoff::Error<StreamError>>>,
{
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(MAX_CONNECT_ELAPSED),
        ..ExponentialBackoff::default()
    };

    retry(backoff, operation).await
}

/// Helper to wrap a StreamError into a backoff::Error.
fn transient_error(err: StreamError) -> backoff::Error<StreamError> {
    warn!("Transient error encountered, retrying: {}", err);
    backoff::Error::transient(err)
}

fn permanent_error(err: StreamError) -> backoff::Error<StreamError> {
    backoff::Error::permanent(err)
}

pub fn wrap_error(err: StreamError) -> backoff::Error<StreamError> {
    if err.is_transient() {
        transient_error(err)
    } else {
        permanent_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_transient_and_stops_on_permanent() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let value = execute_with_retry(move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(wrap_error(StreamError::ConnectionError("refused".to_string())))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let err = execute_with_retry(move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(wrap_error(StreamError::ConfigurationError("bad uri".to_string())))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::ConfigurationError(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
