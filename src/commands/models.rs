use std::path::PathBuf;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Trace file of one worker
    pub trace: PathBuf,

    /// Worker name (defaults to the trace file name without its suffix)
    pub worker: Option<String>,

    /// Run name the report is filed under
    pub run: String,

    /// Output path for the JSON worker report
    pub output: PathBuf,

    /// Optional TOML analysis config
    pub config: Option<PathBuf>,

    /// Keep display units instead of rescaling each step
    pub raw_times: bool,

    /// Print a per-step summary to stdout
    pub print_summary: bool,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            trace: PathBuf::new(),
            worker: None,
            run: "default".to_string(),
            output: PathBuf::from("report.json"),
            config: None,
            raw_times: false,
            print_summary: false,
        }
    }
}

/// Arguments for the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Directory holding one trace file per worker
    pub dir: PathBuf,

    /// Run name (defaults to the directory name)
    pub name: Option<String>,

    /// Output path for the JSON run report
    pub output: PathBuf,

    /// Also write one worker report per worker into this directory
    pub workers_dir: Option<PathBuf>,

    pub config: Option<PathBuf>,

    pub raw_times: bool,

    /// Worker threads (None = one per CPU)
    pub threads: Option<usize>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            name: None,
            output: PathBuf::from("run.json"),
            workers_dir: None,
            config: None,
            raw_times: false,
            threads: None,
        }
    }
}

/// Arguments for the summary command
#[derive(Debug, Clone, Default)]
pub struct SummaryArgs {
    /// Run reports to summarize
    pub inputs: Vec<PathBuf>,

    /// Optional JSON output (run -> slot -> mean)
    pub output: Option<PathBuf>,
}
