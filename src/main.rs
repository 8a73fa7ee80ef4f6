//! Trace DAG Studio CLI
//!
//! Turns distributed-training traces into per-thread call trees, per-step
//! role breakdowns and compute/communication overlap DAGs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use trace_dag_studio::commands::{
    display_schema, display_version, execute_analyze, execute_run, execute_summary,
    validate_args, validate_report_file, validate_run_args, AnalyzeArgs, RunArgs, SummaryArgs,
};

/// Trace DAG Studio - step breakdowns for distributed training
#[derive(Parser, Debug)]
#[command(name = "trace-dag")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one worker trace
    Analyze {
        /// Path to the worker's trace JSON
        #[arg(short, long)]
        trace: PathBuf,

        /// Worker name (defaults to the trace file name)
        #[arg(short, long)]
        worker: Option<String>,

        /// Run name the report is filed under
        #[arg(short, long, default_value = "default")]
        run: String,

        /// Output path for the JSON report
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// TOML analysis config (markers, units)
        #[arg(short, long, env = "TRACE_DAG_CONFIG")]
        config: Option<PathBuf>,

        /// Keep normalized times instead of rescaling each step
        #[arg(long)]
        raw_times: bool,

        /// Print a per-step summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Analyze every worker trace of a run directory
    Run {
        /// Directory with one trace file per worker
        #[arg(short, long)]
        dir: PathBuf,

        /// Run name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Output path for the JSON run report
        #[arg(short, long, default_value = "run.json")]
        output: PathBuf,

        /// Also write one worker report per worker into this directory
        #[arg(long)]
        workers_dir: Option<PathBuf>,

        /// TOML analysis config (markers, units)
        #[arg(short, long, env = "TRACE_DAG_CONFIG")]
        config: Option<PathBuf>,

        /// Keep normalized times in worker reports
        #[arg(long)]
        raw_times: bool,

        /// Worker threads (defaults to one per CPU)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Summarize communication timing of run reports
    Summary {
        /// Run report JSON files
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Write the summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Analyze {
            trace,
            worker,
            run,
            output,
            config,
            raw_times,
            summary,
        } => {
            let args = AnalyzeArgs {
                trace,
                worker,
                run,
                output,
                config,
                raw_times,
                print_summary: summary,
            };

            validate_args(&args)?;
            execute_analyze(args)?;
        }

        Commands::Run {
            dir,
            name,
            output,
            workers_dir,
            config,
            raw_times,
            threads,
        } => {
            let args = RunArgs {
                dir,
                name,
                output,
                workers_dir,
                config,
                raw_times,
                threads,
            };

            validate_run_args(&args)?;
            execute_run(args)?;
        }

        Commands::Summary { input, output } => {
            execute_summary(SummaryArgs {
                inputs: input,
                output,
            })?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
