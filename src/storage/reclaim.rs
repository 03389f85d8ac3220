use super::store::SlotStore;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Spawns the periodic space-reclamation loop for one store.
///
/// A pass runs right away and then once per `interval`. Cancellation is only
/// observed between passes, so a running compaction always completes.
pub(crate) fn spawn_reclaimer(
    store: SlotStore,
    network: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    run_pass(&store, &network).await;
                }
            }
        }

        tracing::debug!(target: "beaconstash::storage", network = %network, "reclamation loop stopped");
    })
}

async fn run_pass(store: &SlotStore, network: &str) {
    let started = Instant::now();
    let pass_store = store.clone();
    match tokio::task::spawn_blocking(move || pass_store.reclaim()).await {
        Ok(Ok(())) => {
            tracing::info!(
                target: "beaconstash::storage",
                network,
                elapsed = ?started.elapsed(),
                "space reclamation finished"
            );
        }
        Ok(Err(err)) => {
            tracing::warn!(
                target: "beaconstash::storage",
                network,
                error = %err,
                "space reclamation failed"
            );
        }
        Err(err) => {
            tracing::warn!(
                target: "beaconstash::storage",
                network,
                error = %err,
                "space reclamation task panicked"
            );
        }
    }
}
