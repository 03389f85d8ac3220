//! Runtime glue that wires configs, the network registry, progress reporting,
//! telemetry, and runner orchestration.

pub mod config;
pub mod fatal;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod telemetry;
