use crate::processor::backoff::sleep_with_cancellation;
use crate::processor::cycle::{run_cycle, IngestContext};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Keeps a network's ingestion running, restarting failed cycles after a fixed backoff.
pub(crate) struct Supervisor {
    ctx: IngestContext,
    restart_backoff: Duration,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub(crate) fn new(ctx: IngestContext, shutdown: CancellationToken) -> Self {
        let restart_backoff = ctx.config.restart_backoff();
        Self {
            ctx,
            restart_backoff,
            shutdown,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub(crate) async fn run(self) {
        let network = self.ctx.network.clone();

        while !self.shutdown.is_cancelled() {
            match run_cycle(&self.ctx, &self.shutdown).await {
                Ok(()) if self.shutdown.is_cancelled() => break,
                Ok(()) => {
                    tracing::warn!(network = %network, "ingestion cycle ended without shutdown");
                }
                Err(err) => {
                    tracing::error!(
                        network = %network,
                        error = %format!("{err:#}"),
                        backoff = %humantime::format_duration(self.restart_backoff),
                        "ingestion cycle failed; restarting after backoff"
                    );
                }
            }

            self.ctx.telemetry.record_cycle_restart();
            if sleep_with_cancellation(self.restart_backoff, &self.shutdown)
                .await
                .is_err()
            {
                break;
            }
        }

        tracing::info!(network = %network, "supervisor stopped");
    }
}
