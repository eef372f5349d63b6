//! # License Minting With Bounded Retry
//!
//! Nonce collisions are the one transient mint failure: two transactions
//! from the same signer raced and one lost. They are retried with
//! exponential backoff up to [`MintPolicy::max_attempts`] calls in total.
//! Every other error aborts the saga on first sight.
//!
//! Clients that can classify errors structurally return
//! [`MintError::NonceConflict`] directly. Clients that only see error text
//! go through [`MintError::from_message`].

use std::time::Duration;

use thiserror::Error;

use crate::capability::{LicenseMinter, MintReceipt, MintRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    /// The signer's nonce was already used. Retryable.
    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    #[error("mint rejected: {0}")]
    Rejected(String),

    #[error("mint transport error: {0}")]
    Transport(String),

    /// The mint call succeeded but reported no token.
    #[error("mint returned no license token ids")]
    EmptyTokenIds,
}

impl MintError {
    /// Classify an error message from a client that only exposes text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_nonce_conflict(&message) {
            Self::NonceConflict(message)
        } else {
            Self::Rejected(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NonceConflict(_))
    }
}

/// True when the text mentions a nonce and a collision marker.
pub fn is_nonce_conflict(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("nonce")
        && (lower.contains("lower") || lower.contains("too low") || lower.contains("already known"))
}

/// Retry bounds for the mint step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintPolicy {
    /// Total calls, first attempt included.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further one.
    pub backoff_base: Duration,
}

impl Default for MintPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl MintPolicy {
    /// Delay before attempt `failed_attempts + 1`.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

/// A successful mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    /// First token id of the receipt.
    pub token_id: String,
    pub receipt: MintReceipt,
    pub attempts: u32,
}

/// Call the minter, retrying nonce conflicts per `policy`.
pub async fn mint_with_retry(
    minter: &dyn LicenseMinter,
    request: &MintRequest,
    policy: MintPolicy,
) -> Result<MintOutcome, MintError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        metrics::counter!("lexlink_mint_attempts_total").increment(1);

        match minter.mint_license_token(request).await {
            Ok(receipt) => {
                let Some(token_id) = receipt.token_ids.first().cloned() else {
                    return Err(MintError::EmptyTokenIds);
                };
                tracing::info!(
                    order_id = %request.order_id,
                    token_id = %token_id,
                    attempts,
                    "license token minted"
                );
                return Ok(MintOutcome {
                    token_id,
                    receipt,
                    attempts,
                });
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                let delay = policy.delay_after(attempts);
                tracing::warn!(
                    order_id = %request.order_id,
                    attempt = attempts,
                    max_attempts,
                    "mint hit a nonce conflict, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexlink_core::{EvmAddress, IpId, OrderId};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedMinter {
        script: Mutex<VecDeque<Result<MintReceipt, MintError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedMinter {
        fn new(script: Vec<Result<MintReceipt, MintError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl LicenseMinter for ScriptedMinter {
        async fn mint_license_token(&self, _: &MintRequest) -> Result<MintReceipt, MintError> {
            *self.calls.lock() += 1;
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(MintError::Rejected("script exhausted".into())))
        }
    }

    fn receipt(id: &str) -> MintReceipt {
        MintReceipt {
            token_ids: vec![id.to_string()],
            tx_hash: Some("0xabc".into()),
        }
    }

    fn request() -> MintRequest {
        MintRequest {
            ip_id: IpId::new("ip-1").unwrap(),
            license_terms_id: "terms-1".into(),
            receiver: EvmAddress::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            order_id: OrderId::new("o-1").unwrap(),
        }
    }

    fn nonce_too_low() -> Result<MintReceipt, MintError> {
        Err(MintError::from_message("nonce too low"))
    }

    #[test]
    fn classifier_matches_known_phrasings() {
        assert!(is_nonce_conflict("nonce too low"));
        assert!(is_nonce_conflict("Nonce is LOWER than current"));
        assert!(is_nonce_conflict("replacement: nonce already known"));
        assert!(!is_nonce_conflict("insufficient funds"));
        assert!(!is_nonce_conflict("transaction already known"));
        assert!(!is_nonce_conflict("nonce gap"));
    }

    #[test]
    fn backoff_doubles() {
        let p = MintPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
    }

    proptest::proptest! {
        #[test]
        fn backoff_never_shrinks(base_ms in 0u64..10_000, n in 1u32..64) {
            let p = MintPolicy {
                max_attempts: 3,
                backoff_base: Duration::from_millis(base_ms),
            };
            proptest::prop_assert!(p.delay_after(n + 1) >= p.delay_after(n));
        }

        #[test]
        fn only_nonce_conflicts_retry(msg in "[ -~]{0,40}") {
            let err = MintError::from_message(msg.clone());
            proptest::prop_assert_eq!(err.is_retryable(), is_nonce_conflict(&msg));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_nonce_conflicts_then_success() {
        let minter = ScriptedMinter::new(vec![nonce_too_low(), nonce_too_low(), Ok(receipt("1"))]);
        let start = tokio::time::Instant::now();
        let out = mint_with_retry(&minter, &request(), MintPolicy::default())
            .await
            .unwrap();
        assert_eq!(out.token_id, "1");
        assert_eq!(out.attempts, 3);
        assert_eq!(minter.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let minter = ScriptedMinter::new(vec![
            nonce_too_low(),
            nonce_too_low(),
            nonce_too_low(),
            Ok(receipt("1")),
        ]);
        let err = mint_with_retry(&minter, &request(), MintPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::NonceConflict(_)));
        assert_eq!(minter.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let minter = ScriptedMinter::new(vec![
            Err(MintError::from_message("execution reverted")),
            Ok(receipt("1")),
        ]);
        let err = mint_with_retry(&minter, &request(), MintPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MintError::Rejected(_)));
        assert_eq!(minter.calls(), 1);
    }

    #[tokio::test]
    async fn empty_token_list_is_a_failure() {
        let minter = ScriptedMinter::new(vec![Ok(MintReceipt {
            token_ids: vec![],
            tx_hash: None,
        })]);
        let err = mint_with_retry(&minter, &request(), MintPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err, MintError::EmptyTokenIds);
    }
}
