use crate::processor::scheduler::{Scheduler, SchedulerParams};
use crate::processor::worker::SlotWorkerParams;
use crate::processor::worker_pool::WorkerPool;
use crate::runtime::config::IngestConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::progress::{spawn_progress_reporter, ProgressParams};
use crate::runtime::telemetry::Telemetry;
use crate::storage::SlotStore;
use crate::upstream::BeaconClient;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Everything a network's ingestion cycles share across restarts.
#[derive(Clone)]
pub(crate) struct IngestContext {
    pub network: Arc<str>,
    pub store: SlotStore,
    pub client: Arc<dyn BeaconClient>,
    pub telemetry: Arc<Telemetry>,
    pub config: IngestConfig,
}

/// Runs one ingestion cycle inside its own cancellation scope.
///
/// The scope owns the job queue, the worker pool and the progress reporter;
/// all of them are torn down and joined before this returns.
pub(crate) async fn run_cycle(ctx: &IngestContext, shutdown: &CancellationToken) -> Result<()> {
    let cycle_token = shutdown.child_token();
    let fatal = FatalErrorHandler::new(cycle_token.clone());

    let scheduler = Scheduler::new(SchedulerParams {
        network: ctx.network.clone(),
        store: ctx.store.clone(),
        client: ctx.client.clone(),
        telemetry: ctx.telemetry.clone(),
        fatal: fatal.clone(),
        cycle_token: cycle_token.clone(),
        retention_slots: ctx.config.retention_slots(),
        safety_lag_slots: ctx.config.safety_lag_slots(),
        slot_duration: ctx.config.slot_duration(),
    });

    let plan = match scheduler.prepare().await {
        Ok(plan) => plan,
        Err(err) => {
            cycle_token.cancel();
            return if shutdown.is_cancelled() { Ok(()) } else { Err(err) };
        }
    };

    let (jobs_tx, jobs_rx) = mpsc::channel(ctx.config.queue_capacity());
    let pool = WorkerPool::launch(
        ctx.config.concurrency(),
        SlotWorkerParams {
            network: ctx.network.clone(),
            store: ctx.store.clone(),
            client: ctx.client.clone(),
            telemetry: ctx.telemetry.clone(),
            jobs: Arc::new(Mutex::new(jobs_rx)),
            cycle_token: cycle_token.clone(),
        },
        fatal.clone(),
    );
    let progress = spawn_progress_reporter(
        ProgressParams {
            network: ctx.network.clone(),
            telemetry: ctx.telemetry.clone(),
            clock: plan.clock,
            interval: ctx.config.progress_interval(),
            window: ctx.config.rate_window(),
        },
        cycle_token.clone(),
    );

    tracing::info!(
        network = %ctx.network,
        workers = pool.size(),
        start = plan.boundary,
        purged = plan.purged,
        "ingestion cycle started"
    );

    let result = scheduler.run(plan, jobs_tx).await;

    cycle_token.cancel();
    pool.join().await;
    if let Err(err) = progress.await {
        tracing::warn!(network = %ctx.network, error = %err, "progress reporter join failed");
    }

    // A worker may fail after the scheduler already returned on shutdown.
    match (result, fatal.error()) {
        (Err(err), _) => Err(err),
        (Ok(()), Some(err)) => Err(err),
        (Ok(()), None) => Ok(()),
    }
}
