//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Reads and decodes one worker trace
//! 2. Builds thread trees, classifies and normalizes steps
//! 3. Synthesizes step DAGs
//! 4. Writes the worker report

use super::models::AnalyzeArgs;
use crate::aggregator::normalizer::StepMap;
use crate::output::write_report;
use crate::run::{process_payload, ResultSink, Run, RunStore};
use crate::source::{read_trace_file, worker_name};
use crate::utils::config::{load_config, AnalysisConfig};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::path::Path;
use std::time::Instant;

/// Load the analysis config, or the defaults when no file is given
///
/// **Public** - shared by every command that analyzes traces
pub fn resolve_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            info!("Loading analysis config: {}", path.display());
            load_config(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(AnalysisConfig::default()),
    }
}

/// Check analyze arguments before doing any work
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.trace.as_os_str().is_empty() {
        bail!("A trace file is required");
    }
    if args.run.trim().is_empty() {
        bail!("Run name cannot be empty");
    }
    if args.output.as_os_str().is_empty() {
        bail!("Output path cannot be empty");
    }
    Ok(())
}

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Trace file missing or not a trace
/// * Config file invalid
/// * Report cannot be written
pub fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = resolve_config(args.config.as_deref())?;

    let worker = args.worker.clone().unwrap_or_else(|| default_worker_name(&args.trace));
    info!("Analyzing trace of worker '{}': {}", worker, args.trace.display());

    info!("Step 1/3: Reading trace...");
    let payload = read_trace_file(&args.trace)
        .with_context(|| format!("Failed to read trace {}", args.trace.display()))?;
    debug!("Trace holds {} records", payload.events.len());

    info!("Step 2/3: Building trees and step breakdown...");
    let output = process_payload(&worker, &payload, &config);
    info!(
        "{} thread trees ({} framework), {} steps",
        output.operator_trees.len(),
        output.framework_trees.len(),
        output.steps.len()
    );

    let mut run = Run::new(&args.run);
    run.add_profile(output);
    let mut store = RunStore::new(config);
    store.publish(run);

    info!("Step 3/3: Writing report...");
    let report = store
        .worker_report(&args.run, &worker, args.raw_times)
        .context("Failed to assemble worker report")?;
    write_report(&report, &args.output).context("Failed to write worker report")?;
    info!("✓ Report written to: {}", args.output.display());

    if args.print_summary {
        print_step_summary(&report.steps);
    }

    info!("Analysis completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// **Private** - worker name from the trace file name
fn default_worker_name(trace: &Path) -> String {
    let file_name = trace
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("worker");
    worker_name(file_name).unwrap_or(file_name).to_string()
}

/// **Private** - one line per step
fn print_step_summary(steps: &StepMap) {
    println!("\n{}", "=".repeat(60));
    println!("STEP SUMMARY");
    println!("{}", "=".repeat(60));
    for (step, record) in steps {
        println!(
            "Step {:>4}: forward {:>2}  loss {}  backward {:>2}  optimizer {}  broadcasts {:>2}",
            step,
            record.forward_nodes().len(),
            if record.loss.is_some() { "yes" } else { "no " },
            record.backward_nodes().len(),
            if record.optimizer.is_some() { "yes" } else { "no " },
            record.broadcasts.len()
        );
    }
    if steps.is_empty() {
        println!("No training steps found");
    }
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_worker_name() {
        assert_eq!(default_worker_name(Path::new("/tmp/rank0.pt.trace.json")), "rank0");
        assert_eq!(default_worker_name(Path::new("trace.json")), "trace.json");
    }

    #[test]
    fn test_validate_args() {
        let args = AnalyzeArgs {
            trace: PathBuf::from("a.pt.trace.json"),
            ..Default::default()
        };
        assert!(validate_args(&args).is_ok());

        let args = AnalyzeArgs {
            run: " ".to_string(),
            ..args
        };
        assert!(validate_args(&args).is_err());
        assert!(validate_args(&AnalyzeArgs::default()).is_err());
    }
}
