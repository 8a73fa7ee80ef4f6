//! Summary command implementation.
//!
//! Collects the communication timing of one or more run reports into a
//! run -> slot -> mean table.

use super::models::SummaryArgs;
use crate::aggregator::summary::TimingSummary;
use crate::output::{read_report, write_report, RunReport};
use anyhow::{bail, Context, Result};
use log::info;
use std::collections::BTreeMap;

/// Run name -> communication timing
pub type RunSummary = BTreeMap<String, TimingSummary>;

/// Read every run report and key its timing by run name
///
/// **Public** - a later report for the same run replaces an earlier one
pub fn collect_summary(args: &SummaryArgs) -> Result<RunSummary> {
    if args.inputs.is_empty() {
        bail!("At least one run report is required");
    }

    let mut summary = RunSummary::new();
    for path in &args.inputs {
        let report: RunReport =
            read_report(path).with_context(|| format!("Failed to read run report {}", path.display()))?;
        info!("Loaded run '{}' ({} workers)", report.run, report.workers.len());
        summary.insert(report.run, report.communication_timing);
    }
    Ok(summary)
}

/// Execute the summary command
///
/// **Public** - main entry point called from main.rs
pub fn execute_summary(args: SummaryArgs) -> Result<()> {
    let summary = collect_summary(&args)?;

    println!("{}", "=".repeat(60));
    println!("COMMUNICATION TIMING (mean per slot)");
    println!("{}", "=".repeat(60));
    for (run, timing) in &summary {
        println!("{}", run);
        if timing.is_empty() {
            println!("  (no communication recorded)");
        }
        for (slot, mean) in timing {
            println!("  {:<20} {:>12.4}", slot, mean);
        }
    }
    println!("{}", "=".repeat(60));

    if let Some(output) = &args.output {
        write_report(&summary, output).context("Failed to write summary")?;
        info!("✓ Summary written to: {}", output.display());
    }

    Ok(())
}
