//! Run command implementation.
//!
//! Loads every worker trace of a run directory in parallel, then writes the
//! run report (and optionally one report per worker).

use super::analyze::resolve_config;
use super::models::RunArgs;
use crate::output::write_report;
use crate::run::{ResultSink, RunLoader, RunStore};
use crate::source::DirectorySupplier;
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::path::Path;
use std::time::Instant;

/// Check run arguments before doing any work
pub fn validate_run_args(args: &RunArgs) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("Run directory does not exist: {}", args.dir.display());
    }
    if args.threads == Some(0) {
        bail!("--threads must be at least 1");
    }
    Ok(())
}

/// Execute the run command
///
/// **Public** - main entry point called from main.rs
pub fn execute_run(args: RunArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = resolve_config(args.config.as_deref())?;
    let name = args.name.clone().unwrap_or_else(|| run_name(&args.dir));

    info!("Step 1/3: Loading workers of run '{}'...", name);
    let mut loader = RunLoader::new(config.clone());
    if let Some(threads) = args.threads {
        loader = loader.with_threads(threads);
    }
    let supplier = DirectorySupplier::new(&args.dir);
    let run = loader
        .load(&name, &supplier)
        .with_context(|| format!("Failed to list traces in {}", args.dir.display()))?;

    if run.worker_count() == 0 {
        warn!("No worker trace could be processed");
    }

    let mut store = RunStore::new(config);
    store.publish(run);

    info!("Step 2/3: Writing run report...");
    let report = store.run_report(&name).context("Failed to assemble run report")?;
    write_report(&report, &args.output).context("Failed to write run report")?;
    info!("✓ Run report written to: {}", args.output.display());

    if let Some(dir) = &args.workers_dir {
        info!("Step 3/3: Writing worker reports...");
        for worker in &report.workers {
            let worker_report = store
                .worker_report(&name, worker, args.raw_times)
                .with_context(|| format!("Failed to assemble report of worker '{}'", worker))?;
            let path = dir.join(format!("{}.json", worker));
            write_report(&worker_report, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        info!("✓ {} worker reports written to: {}", report.workers.len(), dir.display());
    } else {
        info!("Step 3/3: Skipping worker reports (not requested)");
    }

    for (slot, mean) in &report.communication_timing {
        info!("  {:<16} {:>10.4}", slot, mean);
    }

    info!("Run completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// **Private** - last path component, or "run"
fn run_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("run")
        .to_string()
}
