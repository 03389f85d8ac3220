//! Throughput and ETA reporting for the ingestion pipeline.
//!
//! The reporter samples the shared [`Telemetry`] counter on its own ticker and
//! never touches the dispatch path; a late tick is skipped, not queued.

use crate::processor::clock::SlotClock;
use crate::runtime::telemetry::Telemetry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sliding window over samples of a monotonically increasing counter.
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: Instant, total: u64) {
        self.samples.push_back((at, total));
        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > self.window && self.samples.len() > 1 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events per second across the retained samples.
    pub fn rate(&self) -> f64 {
        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last_at.duration_since(first_at).as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0.0;
        }
        last.saturating_sub(first) as f64 / elapsed
    }
}

/// Time to cover `remaining` slots at `rate` slots per second.
pub fn estimate_eta(remaining: u64, rate: f64) -> Option<Duration> {
    if remaining == 0 {
        return Some(Duration::ZERO);
    }
    if rate <= f64::EPSILON || !rate.is_finite() {
        return None;
    }
    Some(Duration::from_secs((remaining as f64 / rate).ceil() as u64))
}

pub(crate) struct ProgressParams {
    pub network: Arc<str>,
    pub telemetry: Arc<Telemetry>,
    pub clock: SlotClock,
    pub interval: Duration,
    pub window: Duration,
}

/// Spawns the periodic progress logger; it stops when `shutdown` is cancelled.
pub(crate) fn spawn_progress_reporter(
    params: ProgressParams,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let ProgressParams {
        network,
        telemetry,
        clock,
        interval,
        window,
    } = params;

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rate = RateWindow::new(window);
        let mut last_reported = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    rate.record(Instant::now(), telemetry.completed_slots());
                    let Some((slot, found)) = telemetry.last_completed() else {
                        continue;
                    };
                    if last_reported == Some(slot) {
                        continue;
                    }
                    last_reported = Some(slot);

                    let slots_per_sec = rate.rate();
                    let head = clock.current_slot();
                    let eta = estimate_eta(head.saturating_sub(slot), slots_per_sec)
                        .map(|eta| humantime::format_duration(eta).to_string())
                        .unwrap_or_else(|| "unknown".to_owned());

                    tracing::info!(
                        target: "beaconstash::progress",
                        network = %network,
                        slot,
                        head,
                        status = if found { "block" } else { "empty" },
                        throughput = %format!("{slots_per_sec:.0}/s"),
                        eta = %eta,
                        "ingestion progress"
                    );
                }
            }
        }
    })
}
