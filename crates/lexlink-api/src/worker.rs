//! Background funding poll loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use lexlink_finalize::FundingPoller;

/// Run [`FundingPoller::run_once`] every `every`. A run that overlaps the
/// next tick delays it rather than queueing a burst. A failed run is
/// logged and the loop continues.
pub fn spawn_poll_loop(poller: FundingPoller, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match poller.run_once().await {
                Ok(summary) => {
                    tracing::debug!(processed = summary.processed, "scheduled poll complete");
                }
                Err(e) => tracing::error!("scheduled poll failed: {e}"),
            }
        }
    })
}
