//! Fixed-size worker set for one ingestion cycle.
//!
//! Every worker runs under `catch_unwind`; an error or a panic is published to
//! the cycle's [`FatalErrorHandler`], which cancels the cycle. [`WorkerPool::join`]
//! waits for all of them, so no worker outlives its cycle.

use crate::processor::worker::{SlotWorker, SlotWorkerParams};
use crate::runtime::fatal::FatalErrorHandler;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) struct WorkerPool {
    network: Arc<str>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn launch(
        size: usize,
        params: SlotWorkerParams,
        fatal_handler: FatalErrorHandler,
    ) -> Self {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);

        for worker_id in 0..size {
            let worker = SlotWorker::new(worker_id, &params);
            let fatal_handler = fatal_handler.clone();
            let telemetry = params.telemetry.clone();
            let network = params.network.clone();

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!(
                            network = %network,
                            worker = worker_id,
                            error = %format!("{err:#}"),
                            "worker task exited with error"
                        );
                        telemetry.record_fatal_error();
                        let context = format!("worker {worker_id} exited with error");
                        fatal_handler.trigger(context.as_str(), err);
                    }
                    Err(panic_payload) => {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            network = %network,
                            worker = worker_id,
                            panic = %panic_msg,
                            "worker task panicked"
                        );
                        telemetry.record_fatal_error();
                        let context = format!("worker {worker_id} panicked");
                        let panic_error =
                            anyhow::anyhow!("worker {worker_id} panicked: {panic_msg}");
                        fatal_handler.trigger(context.as_str(), panic_error);
                    }
                }
            });

            workers.push(handle);
        }

        Self {
            network: params.network,
            workers,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit.
    pub(crate) async fn join(self) {
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(
                    network = %self.network,
                    worker = worker_id,
                    error = %err,
                    "worker task join failed"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
