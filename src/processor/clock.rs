use std::time::{Duration, SystemTime};

/// Maps wall-clock time to slot numbers for one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    genesis: SystemTime,
    slot_duration: Duration,
}

impl SlotClock {
    /// `slot_duration` must be non-zero; configs validate this before a clock is built.
    pub fn new(genesis: SystemTime, slot_duration: Duration) -> Self {
        debug_assert!(!slot_duration.is_zero(), "slot duration must be non-zero");
        Self {
            genesis,
            slot_duration,
        }
    }

    pub fn genesis(&self) -> SystemTime {
        self.genesis
    }

    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    /// Slot containing `time`; times before genesis map to slot 0.
    pub fn slot_at(&self, time: SystemTime) -> u64 {
        match time.duration_since(self.genesis) {
            Ok(elapsed) => {
                let slots = elapsed.as_nanos() / self.slot_duration.as_nanos().max(1);
                u64::try_from(slots).unwrap_or(u64::MAX)
            }
            Err(_) => 0,
        }
    }

    pub fn current_slot(&self) -> u64 {
        self.slot_at(SystemTime::now())
    }

    pub fn slot_start(&self, slot: u64) -> SystemTime {
        let nanos = self.slot_duration.as_nanos().saturating_mul(u128::from(slot));
        let offset = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        self.genesis + offset
    }

    /// Earliest wall-clock time at which `slot` may be fetched while staying
    /// `lag` slots behind the head.
    pub fn dispatch_deadline(&self, slot: u64, lag: u64) -> SystemTime {
        self.slot_start(slot.saturating_add(lag))
    }

    /// Time left until `deadline`, zero once it has passed.
    pub fn until(deadline: SystemTime) -> Duration {
        deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}
