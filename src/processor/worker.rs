use crate::runtime::telemetry::Telemetry;
use crate::storage::{SlotRecord, SlotStore};
use crate::upstream::BeaconClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Receiving half of the cycle's job queue, shared by every worker.
pub(crate) type SharedJobs = Arc<Mutex<mpsc::Receiver<u64>>>;

pub(crate) struct SlotWorker {
    id: usize,
    network: Arc<str>,
    store: SlotStore,
    client: Arc<dyn BeaconClient>,
    telemetry: Arc<Telemetry>,
    jobs: SharedJobs,
    cycle_token: CancellationToken,
}

pub(crate) struct SlotWorkerParams {
    pub network: Arc<str>,
    pub store: SlotStore,
    pub client: Arc<dyn BeaconClient>,
    pub telemetry: Arc<Telemetry>,
    pub jobs: SharedJobs,
    pub cycle_token: CancellationToken,
}

impl SlotWorker {
    pub(crate) fn new(id: usize, params: &SlotWorkerParams) -> Self {
        Self {
            id,
            network: params.network.clone(),
            store: params.store.clone(),
            client: params.client.clone(),
            telemetry: params.telemetry.clone(),
            jobs: params.jobs.clone(),
            cycle_token: params.cycle_token.clone(),
        }
    }

    /// Pulls slots until the queue closes or the cycle is cancelled.
    ///
    /// The first failed slot ends the worker with an error and nothing written.
    pub(crate) async fn run(self) -> Result<()> {
        loop {
            let slot = tokio::select! {
                _ = self.cycle_token.cancelled() => break,
                job = self.next_job() => match job {
                    Some(slot) => slot,
                    None => break,
                },
            };

            if !self.process(slot).await? {
                break;
            }
        }

        tracing::debug!(network = %self.network, worker = self.id, "worker stopped");
        Ok(())
    }

    async fn next_job(&self) -> Option<u64> {
        self.jobs.lock().await.recv().await
    }

    /// Returns `Ok(false)` when cancelled mid-fetch.
    async fn process(&self, slot: u64) -> Result<bool> {
        let outcome = tokio::select! {
            _ = self.cycle_token.cancelled() => return Ok(false),
            outcome = self.client.signed_block(slot) => {
                outcome.with_context(|| format!("failed to get block {slot}"))?
            }
        };

        let block = outcome.into_block();
        let found = block.is_some();
        let record = SlotRecord::from_block(block);
        self.store
            .put(slot, &record)
            .with_context(|| format!("failed to store slot {slot}"))?;
        self.telemetry.record_completed(slot, found);

        tracing::trace!(
            network = %self.network,
            worker = self.id,
            slot,
            found,
            "slot ingested"
        );
        Ok(true)
    }
}
