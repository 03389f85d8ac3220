use crate::storage::StoredBlock;
use anyhow::Result;
use futures::future::BoxFuture;
use std::time::SystemTime;

/// Result of asking upstream for the block of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Found(StoredBlock),
    /// Upstream confirmed that no block was produced for the slot.
    Missing,
}

impl BlockOutcome {
    pub fn into_block(self) -> Option<StoredBlock> {
        match self {
            BlockOutcome::Found(block) => Some(block),
            BlockOutcome::Missing => None,
        }
    }
}

/// The two upstream operations the ingestion pipeline depends on.
///
/// Implementations must map every "no block at this slot" answer to
/// [`BlockOutcome::Missing`]; any `Err` is treated as fatal for the running
/// ingestion cycle.
pub trait BeaconClient: Send + Sync {
    fn genesis_time(&self) -> BoxFuture<'_, Result<SystemTime>>;

    fn signed_block(&self, slot: u64) -> BoxFuture<'_, Result<BlockOutcome>>;
}
