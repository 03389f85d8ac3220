//! Upstream beacon node access: the client abstraction consumed by the ingestion
//! pipeline, the HTTP adapter over the standard beacon REST API, and the
//! missing-block classifier that adapter relies on.

pub mod client;
pub mod http;
pub mod missing;
pub mod options;

pub use client::{BeaconClient, BlockOutcome};
pub use http::{HttpBeaconClient, UpstreamError};
pub use missing::{classify_error_response, ResponseClass, MISSING_BLOCK_INDICATORS};
pub use options::UpstreamOptions;
