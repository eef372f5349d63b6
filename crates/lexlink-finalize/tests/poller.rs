//! Funding poller runs against fake ledger and explorer.

mod common;

use common::Harness;
use lexlink_finalize::PollOutcome;
use lexlink_state::{OrderStatus, PaymentMode, PaymentProof};

#[tokio::test]
async fn ckbtc_balance_covering_amount_finalizes() {
    let h = Harness::new();
    h.seed_ip().await;
    let order = h.seed_order("o-1", PaymentMode::Ckbtc, 10_000).await;
    h.ledger.credit(&order, 10_500);

    let summary = h.poller().run_once().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert!(matches!(
        summary.outcomes[0].outcome,
        PollOutcome::Finalized { ref token_id } if token_id == "1"
    ));

    let stored = h.order("o-1").await;
    assert_eq!(stored.status, OrderStatus::Finalized);
    assert!(matches!(
        stored.payment_proof,
        Some(PaymentProof::Ckbtc { minted_amount: 10_500, .. })
    ));
    assert!(h.payment.calls.lock().is_empty());
}

#[tokio::test]
async fn short_ckbtc_balance_waits() {
    let h = Harness::new();
    h.seed_ip().await;
    let order = h.seed_order("o-1", PaymentMode::Ckbtc, 10_000).await;
    h.ledger.credit(&order, 9_999);

    let summary = h.poller().run_once().await.unwrap();
    assert_eq!(
        summary.outcomes[0].outcome,
        PollOutcome::AwaitingFunds {
            received_sats: 9_999
        }
    );
    assert_eq!(h.order("o-1").await.status, OrderStatus::Pending);
    assert_eq!(h.minter.calls(), 0);
}

#[tokio::test]
async fn btc_order_moves_through_funded_to_finalized() {
    let h = Harness::new();
    h.seed_ip().await;
    let order = h.seed_order("o-1", PaymentMode::Btc, 250_000).await;
    let address = order.escrow_address();

    h.explorer.fund(&address, 250_000, 0);
    let first = h.poller().run_once().await.unwrap();
    assert_eq!(
        first.outcomes[0].outcome,
        PollOutcome::Funded {
            confirmations: 0,
            required: 1
        }
    );
    let funded = h.order("o-1").await;
    assert_eq!(funded.status, OrderStatus::Funded);
    assert!(funded.funded_at.is_some());

    h.explorer.fund(&address, 250_000, 1);
    let second = h.poller().run_once().await.unwrap();
    assert!(matches!(
        second.outcomes[0].outcome,
        PollOutcome::Finalized { .. }
    ));
    let done = h.order("o-1").await;
    assert_eq!(done.status, OrderStatus::Finalized);
    assert_eq!(done.confirmations, 1);
    assert_eq!(
        h.payment.calls.lock().as_slice(),
        [format!("tx-{address}")]
    );

    let third = h.poller().run_once().await.unwrap();
    assert_eq!(third.processed, 0);
}

#[tokio::test]
async fn one_failing_order_does_not_stop_the_run() {
    let h = Harness::new();
    h.seed_ip().await;
    let bad = h.seed_order("o-bad", PaymentMode::Btc, 1_000).await;
    let good = h.seed_order("o-good", PaymentMode::Ckbtc, 1_000).await;
    h.explorer.failing.lock().push(bad.escrow_address());
    h.ledger.credit(&good, 1_000);

    let summary = h.poller().run_once().await.unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.count("error"), 1);
    assert_eq!(summary.count("finalized"), 1);

    let error = summary
        .outcomes
        .iter()
        .find(|r| r.order_id.as_str() == "o-bad")
        .unwrap();
    assert!(matches!(
        &error.outcome,
        PollOutcome::Error { message } if message.contains("502")
    ));
    assert_eq!(h.order("o-bad").await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn saga_failure_is_reported_and_order_left_failed() {
    let h = Harness::new();
    h.seed_ip().await;
    let order = h.seed_order("o-1", PaymentMode::Ckbtc, 1_000).await;
    h.ledger.credit(&order, 1_000);
    *h.media.fail.lock() = true;

    let summary = h.poller().run_once().await.unwrap();
    assert_eq!(summary.count("error"), 1);
    assert_eq!(h.order("o-1").await.status, OrderStatus::Failed);

    // Failed orders are retried by an operator, not by the poller.
    let next = h.poller().run_once().await.unwrap();
    assert_eq!(next.processed, 0);
}
