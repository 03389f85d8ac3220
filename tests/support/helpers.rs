use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, bail, Result};
use beaconstash::{
    BeaconClient, BlockOutcome, BlockRoot, BlockVersion, IngestConfig, StoredBlock, Telemetry,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// Slot length used by pipeline tests so that many slots pass within a test.
pub const TEST_SLOT: Duration = Duration::from_millis(50);

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Deterministic block for `slot`, cycling through the supported forks.
pub fn fixture_block(slot: u64) -> StoredBlock {
    let version = BlockVersion::ALL[(slot % 3) as usize];
    let mut root = [0u8; 32];
    root[..8].copy_from_slice(&slot.to_be_bytes());
    root[31] = 0xee;
    let ssz = slot.to_le_bytes().repeat(16);
    StoredBlock::new(version, BlockRoot(root), ssz)
}

/// Genesis placed so that the head is currently `head_slot`.
pub fn genesis_for_head(head_slot: u32) -> SystemTime {
    SystemTime::now() - TEST_SLOT * head_slot
}

pub fn fast_ingest_config(retention: u64, lag: u64) -> Result<IngestConfig> {
    IngestConfig::builder()
        .retention_slots(retention)
        .safety_lag_slots(lag)
        .concurrency(4)
        .slot_duration(TEST_SLOT)
        .restart_backoff(Duration::from_millis(50))
        .progress_interval(Duration::from_millis(20))
        .rate_window(Duration::from_millis(200))
        .build()
}

#[derive(Default)]
struct RecordingState {
    blocks: HashMap<u64, StoredBlock>,
    fail_once: HashSet<u64>,
    fail_always: HashSet<u64>,
    requested: Vec<u64>,
    genesis_calls: usize,
}

/// In-memory upstream: configured slots return blocks, everything else is
/// missing. Every request is recorded.
#[derive(Clone)]
pub struct RecordingBeacon {
    genesis: SystemTime,
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBeacon {
    pub fn new(genesis: SystemTime) -> Self {
        Self {
            genesis,
            state: Arc::new(Mutex::new(RecordingState::default())),
        }
    }

    /// Serves [`fixture_block`] for every even slot in `range`.
    pub fn with_even_blocks(self, range: std::ops::Range<u64>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for slot in range.filter(|slot| slot % 2 == 0) {
                state.blocks.insert(slot, fixture_block(slot));
            }
        }
        self
    }

    pub fn fail_once(self, slot: u64) -> Self {
        self.state.lock().unwrap().fail_once.insert(slot);
        self
    }

    pub fn fail_always(self, slot: u64) -> Self {
        self.state.lock().unwrap().fail_always.insert(slot);
        self
    }

    pub fn requested(&self) -> Vec<u64> {
        self.state.lock().unwrap().requested.clone()
    }

    pub fn genesis_calls(&self) -> usize {
        self.state.lock().unwrap().genesis_calls
    }

    pub fn into_client(self) -> Arc<dyn BeaconClient> {
        Arc::new(self)
    }
}

impl BeaconClient for RecordingBeacon {
    fn genesis_time(&self) -> BoxFuture<'_, Result<SystemTime>> {
        self.state.lock().unwrap().genesis_calls += 1;
        let genesis = self.genesis;
        async move { Ok(genesis) }.boxed()
    }

    fn signed_block(&self, slot: u64) -> BoxFuture<'_, Result<BlockOutcome>> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.requested.push(slot);
            if state.fail_always.contains(&slot) || state.fail_once.remove(&slot) {
                Err(anyhow!("upstream returned HTTP 500 for slot {slot}"))
            } else {
                Ok(match state.blocks.get(&slot) {
                    Some(block) => BlockOutcome::Found(block.clone()),
                    None => BlockOutcome::Missing,
                })
            }
        };
        async move { outcome }.boxed()
    }
}

pub async fn wait_for<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("timed out after {timeout:?} waiting for {what}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_for_completed(
    telemetry: &Arc<Telemetry>,
    expected: u64,
    timeout: Duration,
) -> Result<()> {
    wait_for(
        &format!("{expected} completed slots"),
        timeout,
        || telemetry.completed_slots() >= expected,
    )
    .await
}
