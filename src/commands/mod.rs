//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod analyze;
pub mod ingest;
pub mod models;
pub mod summary;
pub mod utils;

// Re-export main command functions
pub use analyze::{execute_analyze, validate_args};
pub use ingest::{execute_run, validate_run_args};
pub use models::{AnalyzeArgs, RunArgs, SummaryArgs};
pub use summary::execute_summary;
pub use utils::{display_schema, display_version, validate_report_file};
