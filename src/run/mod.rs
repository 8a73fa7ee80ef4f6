//! Runs and workers.
//!
//! A run is a set of worker traces captured together. This module handles:
//! - Processing one worker's trace end to end
//! - Loading every worker of a run in parallel
//! - Caching finished runs and serving derived views of them

pub mod loader;
pub mod store;
pub mod worker;

pub use loader::RunLoader;
pub use store::{ResultSink, Run, RunStore};
pub use worker::{process_payload, WorkerOutput};
