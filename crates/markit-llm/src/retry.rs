//! Retry with exponential back-off and jitter for provider calls.
//!
//! Only transport failures, rate limits and 5xx outages are retried. Timeouts
//! are not: a call that already ran for the full bound is surfaced as-is.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

pub(crate) fn is_retriable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Transport(_)
        | ProviderError::RateLimited(_)
        | ProviderError::Outage { .. } => true,
        ProviderError::InvalidInput(_)
        | ProviderError::Timeout { .. }
        | ProviderError::Auth(_)
        | ProviderError::UnexpectedStatus { .. }
        | ProviderError::Decode { .. }
        | ProviderError::EmptyOutput { .. }
        | ProviderError::Misconfiguration(_) => false,
    }
}

const MAX_DELAY_MS: u64 = 30_000;

/// Sleep before retry number `attempt` (1-based).
///
/// `jitter` scales the exponential step and is expected in `[0.75, 1.25]`.
/// The 30 s cap applies after jitter. With the default
/// `MARKIT_PROVIDER_BACKOFF_BASE_MS=1000`:
///
/// | Retry | Sleep range       |
/// |-------|-------------------|
/// | 1     | 750 – 1 250 ms    |
/// | 2     | 1 500 – 2 500 ms  |
/// | 3     | 3 000 – 5 000 ms  |
/// | 4     | 6 000 – 10 000 ms |
/// | 5     | 12 – 20 s         |
/// | 6+    | 24 – 30 s         |
fn backoff_delay(attempt: u32, backoff_base_ms: u64, jitter: f64) -> Duration {
    let step = backoff_base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (step as f64 * jitter) as u64;
    Duration::from_millis(jittered.min(MAX_DELAY_MS))
}

/// Runs `operation` once, then up to `max_retries` more times while it fails
/// with a retriable error. See [`backoff_delay`] for the sleep schedule.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut retry = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retriable(&err) && retry < max_retries => err,
            Err(err) => {
                if retry > 0 {
                    tracing::warn!(retries = retry, error = %err, "provider call failed after retries");
                }
                return Err(err);
            }
        };
        retry += 1;
        let delay = backoff_delay(retry, backoff_base_ms, rand::random_range(0.75..=1.25));
        tracing::warn!(
            retry,
            max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(MAX_DELAY_MS),
            error = %err,
            "provider transient error, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
