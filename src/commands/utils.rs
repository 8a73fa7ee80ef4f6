use crate::output::{read_report, RunReport, WorkerReport};
use crate::utils::config::SCHEMA_VERSION;
use anyhow::{bail, Result};
use serde_json::Value;
use std::path::PathBuf;

/// Validate a worker or run report JSON file
pub fn validate_report_file(file_path: PathBuf) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let raw: Value = read_report(&file_path)?;

    if raw.get("worker").is_some() {
        let report: WorkerReport = serde_json::from_value(raw)?;
        println!("✓ Valid worker report JSON");
        println!("  Version: {}", report.version);
        println!("  Run: {}", report.run);
        println!("  Worker: {}", report.worker);
        println!("  Threads: {}", report.operator_trees.len());
        if !report.framework_trees.is_empty() {
            println!("  Framework Threads: {}", report.framework_trees.len());
        }
        println!("  Steps: {}", report.steps.len());
        println!(
            "  DAG Edges: {}",
            report.dag.values().map(|d| d.edges.len()).sum::<usize>()
        );
    } else if raw.get("workers").is_some() {
        let report: RunReport = serde_json::from_value(raw)?;
        println!("✓ Valid run report JSON");
        println!("  Version: {}", report.version);
        println!("  Run: {}", report.run);
        println!("  Workers: {}", report.workers.len());
        println!("  Timing Slots: {}", report.communication_timing.len());
    } else {
        bail!("Not a worker or run report: {}", file_path.display());
    }

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Trace DAG Studio Report Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Worker Report:");
        println!("  version: string           - Schema version (e.g., '1.0.0')");
        println!("  run, worker: string       - Run and worker names");
        println!("  generated_at: string      - RFC 3339 timestamp");
        println!("  operator_trees: object    - Thread id -> call tree");
        println!("    name, type: string");
        println!("    start_time, end_time    - Raw trace units");
        println!("    external_id: number?    - Operator/runtime link id");
        println!("    children: array");
        println!("  framework_trees?: object  - Thread id -> framework-profile tree");
        println!("  steps: object             - Step number -> role nodes");
        println!("    broadcasts?, forward?, loss?, backward?, optimizer?");
        println!("    node: {{name, start_time, end_time, dur, category[, children]}}");
        println!("  dag: object               - Step number -> graph");
        println!("    nodes: [{{id, label, category, lane, start_time, end_time, dur}}]");
        println!("    edges: [{{source, target, kind}}]");
        println!();
        println!("Run Report:");
        println!("  version, run, generated_at: string");
        println!("  workers: array            - Worker names loaded");
        println!("  communication_timing: object - Slot -> mean duration");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Trace DAG Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Operator trees, step breakdowns and overlap DAGs for distributed-training traces.");
}
