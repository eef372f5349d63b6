//! Retry with exponential backoff for idempotent capability reads.
//!
//! Only transport failures (connect errors, timeouts) are retried. Any HTTP
//! response, error statuses included, is returned to the caller as-is.
//! Writes (payment confirmation, minting, anchoring, uploads) never go
//! through here.

use std::time::Duration;

/// Retries after the initial request.
const MAX_RETRIES: u32 = 2;

/// Delay before the first retry; doubled for each further one.
const BASE_DELAY_MS: u64 = 200;

pub(crate) async fn retry_send<F, Fut>(operation: &str, f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "capability request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
