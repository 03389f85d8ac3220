//! Ingestion pipeline: slot clock, scheduler, worker pool, the per-cycle scope
//! tying them together, and the supervisor that restarts failed cycles.

pub mod backoff;
pub mod clock;
pub mod cycle;
pub mod scheduler;
pub mod supervisor;
pub mod worker;
pub mod worker_pool;
