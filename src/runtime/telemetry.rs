use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

const NO_SLOT: u64 = u64::MAX;

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Best-effort counters for one network's ingestion pipeline.
///
/// Workers bump these on every completed slot; the progress monitor and tests
/// read them. Races only skew reporting.
#[derive(Debug)]
pub struct Telemetry {
    completed_slots: AtomicU64,
    empty_slots: AtomicU64,
    dispatched_slots: AtomicU64,
    fatal_errors: AtomicU64,
    cycle_restarts: AtomicU64,
    purged_slots: AtomicU64,
    last_slot: AtomicU64,
    last_found: AtomicBool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            completed_slots: AtomicU64::new(0),
            empty_slots: AtomicU64::new(0),
            dispatched_slots: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            cycle_restarts: AtomicU64::new(0),
            purged_slots: AtomicU64::new(0),
            last_slot: AtomicU64::new(NO_SLOT),
            last_found: AtomicBool::new(false),
        }
    }
}

impl Telemetry {
    pub fn record_completed(&self, slot: u64, found: bool) {
        self.completed_slots.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.empty_slots.fetch_add(1, Ordering::Relaxed);
        }
        self.last_slot.store(slot, Ordering::Relaxed);
        self.last_found.store(found, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched_slots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal_error(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_restart(&self) {
        self.cycle_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purged(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.purged_slots.fetch_add(count, Ordering::Relaxed);
    }

    pub fn completed_slots(&self) -> u64 {
        self.completed_slots.load(Ordering::Relaxed)
    }

    pub fn cycle_restarts(&self) -> u64 {
        self.cycle_restarts.load(Ordering::Relaxed)
    }

    pub fn fatal_errors(&self) -> u64 {
        self.fatal_errors.load(Ordering::Relaxed)
    }

    /// Most recently completed slot and whether it held a block.
    pub fn last_completed(&self) -> Option<(u64, bool)> {
        match self.last_slot.load(Ordering::Relaxed) {
            NO_SLOT => None,
            slot => Some((slot, self.last_found.load(Ordering::Relaxed))),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            completed_slots: self.completed_slots.load(Ordering::Relaxed),
            empty_slots: self.empty_slots.load(Ordering::Relaxed),
            dispatched_slots: self.dispatched_slots.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
            cycle_restarts: self.cycle_restarts.load(Ordering::Relaxed),
            purged_slots: self.purged_slots.load(Ordering::Relaxed),
            last_completed: self.last_completed(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub completed_slots: u64,
    pub empty_slots: u64,
    pub dispatched_slots: u64,
    pub fatal_errors: u64,
    pub cycle_restarts: u64,
    pub purged_slots: u64,
    pub last_completed: Option<(u64, bool)>,
}
