use std::path::PathBuf;

/// Errors surfaced by the slot store.
///
/// [`StorageError::NotFound`] means the slot was never scraped (or was purged). A
/// slot that upstream confirmed as empty is *not* an error: it decodes into
/// [`SlotRecord::Empty`](super::SlotRecord::Empty).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create store directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rocksdb error: {0}")]
    Db(#[from] rocksdb::Error),

    #[error("slot {slot} not found")]
    NotFound { slot: u64 },

    #[error("corrupt record for slot {slot}: {reason}")]
    Corrupt { slot: u64, reason: String },

    #[error("block of slot {slot} has {size} bytes, above the {limit} byte limit")]
    TooLarge { slot: u64, size: usize, limit: usize },

    #[error("failed to decompress payload of slot {slot}")]
    Decompress {
        slot: u64,
        #[source]
        source: lz4_flex::block::DecompressError,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn corrupt(slot: u64, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            slot,
            reason: reason.into(),
        }
    }
}
