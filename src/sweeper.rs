use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::auth::TokenLifecycle;

/// Periodically delete expired refresh credentials.
///
/// Runs until the returned handle is aborted. A failed sweep is logged and
/// retried on the next tick.
pub fn spawn_expiry_sweeper(lifecycle: TokenLifecycle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_sweep(&lifecycle).await;
        }
    })
}

/// One sweep pass. Returns the number of rows deleted, zero on failure.
pub async fn run_sweep(lifecycle: &TokenLifecycle) -> u64 {
    match lifecycle.sweep_expired().await {
        Ok(0) => {
            tracing::debug!("Expiry sweep found nothing to delete");
            0
        }
        Ok(deleted) => {
            tracing::info!(deleted, "Expired refresh credentials deleted");
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Expiry sweep failed");
            0
        }
    }
}
