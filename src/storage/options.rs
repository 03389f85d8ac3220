//! Tuning knobs for the RocksDB store and its reclamation task.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_RECLAIM_THRESHOLD: f64 = 0.7;
const DEFAULT_MIN_BLOB_SIZE: u64 = 512;
const DEFAULT_BLOB_GC_AGE_CUTOFF: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Pause between two space-reclamation passes.
    pub reclaim_interval: Duration,
    /// Fraction of stale bytes in a blob file above which it is rewritten.
    pub reclaim_threshold: f64,
    /// Values at least this large are moved to blob files.
    pub min_blob_size: u64,
    /// Share of the oldest blob files eligible for relocation during compaction.
    pub blob_gc_age_cutoff: f64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
            reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
            min_blob_size: DEFAULT_MIN_BLOB_SIZE,
            blob_gc_age_cutoff: DEFAULT_BLOB_GC_AGE_CUTOFF,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        if self.reclaim_interval.is_zero() {
            bail!("reclaim_interval must be greater than 0");
        }
        if !(self.reclaim_threshold > 0.0 && self.reclaim_threshold <= 1.0) {
            bail!("reclaim_threshold must be within (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.blob_gc_age_cutoff) {
            bail!("blob_gc_age_cutoff must be within [0, 1]");
        }
        Ok(())
    }

    pub(crate) fn to_rocksdb(&self) -> rocksdb::Options {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::None);
        opts.set_keep_log_file_num(4);

        // Block payloads live in blob files so compaction only rewrites small keys;
        // stale blobs are reclaimed by blob GC during compaction.
        opts.set_enable_blob_files(true);
        opts.set_min_blob_size(self.min_blob_size);
        opts.set_enable_blob_gc(true);
        opts.set_blob_gc_age_cutoff(self.blob_gc_age_cutoff);
        opts.set_blob_gc_force_threshold(self.reclaim_threshold);
        opts
    }
}
