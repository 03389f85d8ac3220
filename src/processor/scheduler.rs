//! Slot scheduling for one ingestion cycle.
//!
//! The scheduler asks upstream for genesis, purges everything at or below the
//! retention boundary, then walks slots upward forever: already-filled slots are
//! skipped in batched scans off the async runtime, the rest are held back until
//! they are `lag` slots old and handed to the worker pool through a bounded
//! queue.

use crate::processor::backoff::sleep_until_wall_clock;
use crate::processor::clock::SlotClock;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::Telemetry;
use crate::storage::SlotStore;
use crate::upstream::BeaconClient;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Slots checked per blocking store scan when skipping filled runs.
const FILLED_SCAN_BATCH: u64 = 512;

/// Scheduler position within a cycle. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSlotCursor {
    next: u64,
    head: u64,
    lag: u64,
}

impl PendingSlotCursor {
    pub fn new(start: u64, head: u64, lag: u64) -> Self {
        Self {
            next: start,
            head,
            lag,
        }
    }

    pub fn next_slot(&self) -> u64 {
        self.next
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn lag(&self) -> u64 {
        self.lag
    }

    fn jump_to(&mut self, slot: u64) {
        self.next = self.next.max(slot);
    }

    fn advance(&mut self) {
        self.next = self.next.saturating_add(1);
    }

    fn observe_head(&mut self, head: u64) {
        self.head = self.head.max(head);
    }
}

/// Inputs resolved once at the start of a cycle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CyclePlan {
    pub clock: SlotClock,
    pub boundary: u64,
    pub purged: u64,
}

pub(crate) struct SchedulerParams {
    pub network: Arc<str>,
    pub store: SlotStore,
    pub client: Arc<dyn BeaconClient>,
    pub telemetry: Arc<Telemetry>,
    pub fatal: FatalErrorHandler,
    pub cycle_token: CancellationToken,
    pub retention_slots: u64,
    pub safety_lag_slots: u64,
    pub slot_duration: Duration,
}

pub(crate) struct Scheduler {
    network: Arc<str>,
    store: SlotStore,
    client: Arc<dyn BeaconClient>,
    telemetry: Arc<Telemetry>,
    fatal: FatalErrorHandler,
    cycle_token: CancellationToken,
    retention_slots: u64,
    safety_lag_slots: u64,
    slot_duration: Duration,
}

impl Scheduler {
    pub(crate) fn new(params: SchedulerParams) -> Self {
        Self {
            network: params.network,
            store: params.store,
            client: params.client,
            telemetry: params.telemetry,
            fatal: params.fatal,
            cycle_token: params.cycle_token,
            retention_slots: params.retention_slots,
            safety_lag_slots: params.safety_lag_slots,
            slot_duration: params.slot_duration,
        }
    }

    /// Resolves genesis and drops every slot at or below the retention boundary.
    pub(crate) async fn prepare(&self) -> Result<CyclePlan> {
        let genesis = tokio::select! {
            _ = self.cycle_token.cancelled() => return Err(anyhow!("cycle cancelled before genesis lookup")),
            genesis = self.client.genesis_time() => genesis.context("failed to get genesis time")?,
        };

        let clock = SlotClock::new(genesis, self.slot_duration);
        let head = clock.current_slot();
        let boundary = head.saturating_sub(self.retention_slots);

        let store = self.store.clone();
        let purged = tokio::task::spawn_blocking(move || store.purge(0, boundary))
            .await
            .context("purge task panicked")?
            .with_context(|| format!("failed to purge slots up to {boundary}"))?;
        self.telemetry.record_purged(purged);

        tracing::info!(
            network = %self.network,
            head,
            boundary,
            purged,
            "prepared ingestion cycle"
        );

        Ok(CyclePlan {
            clock,
            boundary,
            purged,
        })
    }

    /// Dispatches slots until the cycle is cancelled.
    ///
    /// Returns the captured fatal error when a worker aborted the cycle, and
    /// `Ok(())` on a plain shutdown.
    pub(crate) async fn run(self, plan: CyclePlan, jobs: mpsc::Sender<u64>) -> Result<()> {
        let mut cursor = PendingSlotCursor::new(
            plan.boundary,
            plan.clock.current_slot(),
            self.safety_lag_slots,
        );

        loop {
            if self.cycle_token.is_cancelled() {
                return self.finish();
            }

            let from = cursor.next_slot();
            let store = self.store.clone();
            let gap =
                tokio::task::spawn_blocking(move || store.next_unfilled(from, FILLED_SCAN_BATCH))
                    .await
                    .context("slot scan task panicked")?
                    .with_context(|| format!("failed to scan slots from {from}"))?;
            let Some(slot) = gap else {
                cursor.jump_to(from.saturating_add(FILLED_SCAN_BATCH));
                continue;
            };
            cursor.jump_to(slot);

            let deadline = plan.clock.dispatch_deadline(slot, cursor.lag());
            if SystemTime::now() < deadline {
                tracing::debug!(
                    network = %self.network,
                    slot,
                    wait = ?SlotClock::until(deadline),
                    "waiting for slot to reach safety lag"
                );
                if sleep_until_wall_clock(deadline, &self.cycle_token)
                    .await
                    .is_err()
                {
                    return self.finish();
                }
            }

            tokio::select! {
                _ = self.cycle_token.cancelled() => return self.finish(),
                sent = jobs.send(slot) => {
                    if sent.is_err() {
                        return self.finish();
                    }
                }
            }

            self.telemetry.record_dispatched();
            cursor.observe_head(plan.clock.current_slot());
            cursor.advance();
        }
    }

    fn finish(&self) -> Result<()> {
        match self.fatal.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
