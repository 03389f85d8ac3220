//! Persistent per-network slot storage: record model, on-disk codec, RocksDB
//! backed store, and the background space-reclamation task.

pub mod codec;
pub mod error;
pub mod options;
pub mod reclaim;
pub mod record;
pub mod store;

pub use error::StorageError;
pub use options::StoreOptions;
pub use record::{BlockRoot, BlockVersion, SlotRecord, StoredBlock};
pub use store::{SlotCount, SlotStore, StoreHandle};
