//! Output writers for report data.
//!
//! This module handles writing data to disk:
//! - Worker reports (trees, steps, DAGs)
//! - Run reports (workers, communication timing)

pub mod json;
pub mod schema;

// Re-export main functions
pub use json::{read_report, write_report};
pub use schema::{RunReport, WorkerReport};
