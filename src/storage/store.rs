use super::codec::{
    decode_record, decode_slot_key, decode_version, encode_record, slot_key, VersionTag,
    NAMESPACE_SLOT,
};
use super::error::StorageError;
use super::options::StoreOptions;
use super::reclaim::spawn_reclaimer;
use super::record::SlotRecord;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Totals reported by [`SlotStore::count`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotCount {
    /// Processed slots, empty or not.
    pub slots: u64,
    /// Processed slots that hold a block.
    pub blocks: u64,
}

/// Cheaply clonable handle to one network's RocksDB instance.
///
/// All operations are blocking. They are short point operations except
/// [`SlotStore::count`], [`SlotStore::purge`] and [`SlotStore::reclaim`], which
/// async callers should move onto a blocking thread.
#[derive(Clone)]
pub struct SlotStore {
    db: Arc<DB>,
    path: Arc<PathBuf>,
}

impl std::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore").field("path", &self.path).finish()
    }
}

impl SlotStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|source| StorageError::CreateDir {
            path: path.clone(),
            source,
        })?;
        let db = DB::open(&options.to_rocksdb(), &path)?;
        Ok(Self {
            db: Arc::new(db),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_filled(&self, slot: u64) -> Result<bool, StorageError> {
        Ok(self.db.get_pinned(slot_key(slot))?.is_some())
    }

    pub fn get(&self, slot: u64) -> Result<SlotRecord, StorageError> {
        let value = self
            .db
            .get_pinned(slot_key(slot))?
            .ok_or(StorageError::NotFound { slot })?;
        decode_record(slot, &value)
    }

    /// Writes the record for `slot`, replacing any previous one.
    pub fn put(&self, slot: u64, record: &SlotRecord) -> Result<(), StorageError> {
        self.db.put(slot_key(slot), encode_record(slot, record)?)?;
        Ok(())
    }

    /// Deletes every stored slot in `[from, to]` and returns how many existed.
    pub fn purge(&self, from: u64, to: u64) -> Result<u64, StorageError> {
        if from > to {
            return Ok(0);
        }

        let start = slot_key(from);
        let mut batch = WriteBatch::default();
        let mut deleted = 0u64;
        for entry in self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward))
        {
            let (key, _) = entry?;
            let Some(slot) = decode_slot_key(&key) else {
                break;
            };
            if slot > to {
                break;
            }
            batch.delete(&key);
            deleted += 1;
        }

        if deleted > 0 {
            self.db.write(batch)?;
        }
        Ok(deleted)
    }

    /// Returns the first slot at or after `from` with no record, looking at no
    /// more than `max_scan` slots. `None` means all of `[from, from + max_scan)`
    /// is filled.
    pub fn next_unfilled(&self, from: u64, max_scan: u64) -> Result<Option<u64>, StorageError> {
        let limit = from.saturating_add(max_scan);
        let mut expected = from;
        let start = slot_key(from);
        for entry in self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward))
        {
            if expected >= limit {
                return Ok(None);
            }
            let (key, _) = entry?;
            match decode_slot_key(&key) {
                Some(slot) if slot == expected => expected = expected.saturating_add(1),
                _ => break,
            }
        }
        Ok((expected < limit).then_some(expected))
    }

    /// Scans every slot record, decoding only the version word.
    pub fn count(&self) -> Result<SlotCount, StorageError> {
        let mut count = SlotCount::default();
        let start = [NAMESPACE_SLOT];
        for entry in self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward))
        {
            let (key, value) = entry?;
            let Some(slot) = decode_slot_key(&key) else {
                break;
            };
            count.slots += 1;
            if let VersionTag::Block(_) = decode_version(slot, &value)? {
                count.blocks += 1;
            }
        }
        Ok(count)
    }

    /// Runs one space-reclamation pass over the slot namespace. Compaction drops
    /// purged keys and rewrites blob files whose stale share crosses the configured
    /// threshold.
    pub fn reclaim(&self) -> Result<(), StorageError> {
        let lower = [NAMESPACE_SLOT];
        let upper = [NAMESPACE_SLOT + 1];
        self.db.compact_range(Some(&lower[..]), Some(&upper[..]));
        self.db.flush()?;
        Ok(())
    }
}

/// Owns a network's store together with its background reclamation task.
pub struct StoreHandle {
    network: String,
    store: SlotStore,
    shutdown: CancellationToken,
    reclaimer: Option<JoinHandle<()>>,
}

impl StoreHandle {
    /// Opens `<data_dir>/<network>` and starts periodic reclamation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        data_dir: impl AsRef<Path>,
        network: &str,
        options: &StoreOptions,
    ) -> Result<Self, StorageError> {
        let store = SlotStore::open(data_dir.as_ref().join(network), options)?;
        let shutdown = CancellationToken::new();
        let reclaimer = spawn_reclaimer(
            store.clone(),
            network.to_owned(),
            options.reclaim_interval,
            shutdown.clone(),
        );

        tracing::info!(
            network,
            path = %store.path().display(),
            "opened slot store"
        );

        Ok(Self {
            network: network.to_owned(),
            store,
            shutdown,
            reclaimer: Some(reclaimer),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    /// Stops reclamation, waiting for an in-flight pass to finish, and releases
    /// this handle's reference to the database.
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.reclaimer.take() {
            if let Err(err) = handle.await {
                tracing::warn!(network = %self.network, error = %err, "reclamation task panicked");
            }
        }
        tracing::info!(network = %self.network, "closed slot store");
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
