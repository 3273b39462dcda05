use crate::config::RetryPolicy;
use crate::error::SessionError;
use backon::BackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless the session is cancelled first.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        return Err(SessionError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Runs `attempt` until it succeeds or `policy` is exhausted, sleeping between
/// attempts as the policy's backoff schedule says.
///
/// Only client errors count as retryable; anything else (a transaction that cannot
/// be built, a cancelled session) is returned as is.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, SessionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let started = Instant::now();
    let mut delays = policy.to_backoff_builder().build();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        attempts += 1;
        match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(SessionError::Client(err)) => {
                tracing::warn!(operation, attempt = attempts, "submission failed: {}", err);
                let out_of_time = policy
                    .max_elapsed()
                    .map(|max| started.elapsed() >= max)
                    .unwrap_or(false);
                match delays.next() {
                    Some(delay) if !out_of_time => pause(cancel, delay).await?,
                    _ => {
                        return Err(SessionError::SubmissionRejected {
                            operation,
                            attempts,
                            reason: err.to_string(),
                        })
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }
}
