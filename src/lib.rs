pub mod processor;
pub mod runtime;
pub mod serve;
pub mod storage;
pub mod upstream;

pub use processor::clock::SlotClock;
pub use processor::scheduler::PendingSlotCursor;
pub use runtime::config::{IngestConfig, IngestConfigBuilder, NetworkConfig, NodeConfig};
pub use runtime::fatal::FatalErrorHandler;
pub use runtime::progress::RateWindow;
pub use runtime::registry::{NetworkContext, NetworkRegistry};
pub use runtime::runner::{ClientFactory, Runner};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use storage::{
    BlockRoot, BlockVersion, SlotCount, SlotRecord, SlotStore, StorageError, StoreHandle,
    StoreOptions, StoredBlock,
};
pub use upstream::{BeaconClient, BlockOutcome, HttpBeaconClient, UpstreamError, UpstreamOptions};
