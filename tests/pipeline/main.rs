#[path = "../support/mod.rs"]
mod support;

mod ingest;
mod serve;
