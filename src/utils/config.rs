//! Configuration and constants for the analysis pipeline.

use crate::aggregator::roles::MarkerTable;
use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Name of the synthetic root that owns every top-level node of a thread
pub const CALL_TREE_ROOT: &str = "CallTreeRoot";

/// Step number is the numeric suffix of a profiler-step marker
pub const PROFILER_STEP_PATTERN: &str = r"ProfilerStep#(\d+)";

/// Trace files a run directory may hold, one per worker.
/// The worker name is everything before the suffix.
pub const TRACE_FILE_SUFFIXES: &[&str] = &[".pt.trace.json", ".trace.json"];

// Some exporters append a window-end marker with a bogus timestamp far past
// the last iteration; drop it when it lies further than a day away.
pub const RECORD_WINDOW_END: &str = "Record Window End";
pub const ITERATION_START_PREFIX: &str = "Iteration Start:";
pub const MAX_RECORD_WINDOW_US: f64 = 24.0 * 3600.0 * 1000.0;

// Argument-bag keys (different profiler versions use different spellings)
pub const EXTERNAL_ID_KEYS: &[&str] = &["External id", "external id", "external_id"];
pub const CORRELATION_ID_KEYS: &[&str] = &["correlation", "correlation_id"];

/// Collective operator names that become Communication nodes
pub const COLLECTIVE_OP_NAMES: &[&str] = &[
    "nccl:broadcast",
    "nccl:reduce",
    "nccl:all_reduce",
    "nccl:all_gather",
    "nccl:reduce_scatter",
    "nccl:all_to_all",
    "gloo:broadcast",
    "gloo:all_reduce",
    "gloo:all_gather",
];

pub const DEFAULT_TIME_DIVISOR: f64 = 1000.0;
pub const DEFAULT_NORMALIZED_SPAN: f64 = 10.0;

/// Tunables for classification, normalization and DAG synthesis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Role markers (role -> literal name and match rule)
    pub markers: MarkerTable,

    /// Name prefixes that tag a node as communication
    pub communication_prefixes: Vec<String>,

    /// Raw trace unit -> normalized unit (1000.0 turns µs into ms)
    pub time_divisor: f64,

    /// Width of a step after rescaling for display
    pub normalized_span: f64,

    /// Clamp `end_time` up to `start_time` when a record says otherwise
    pub clamp_negative_durations: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            markers: MarkerTable::default(),
            communication_prefixes: vec!["nccl:".to_string(), "gloo:".to_string()],
            time_divisor: DEFAULT_TIME_DIVISOR,
            normalized_span: DEFAULT_NORMALIZED_SPAN,
            clamp_negative_durations: true,
        }
    }
}

impl AnalysisConfig {
    /// Whether a node name belongs to the communication namespace
    pub fn is_communication(&self, name: &str) -> bool {
        self.communication_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Reject values that would make normalization meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_divisor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "time_divisor must be positive, got {}",
                self.time_divisor
            )));
        }
        if !(self.normalized_span > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "normalized_span must be positive, got {}",
                self.normalized_span
            )));
        }
        self.markers.validate()
    }
}

/// Load an analysis config from a TOML file
///
/// Missing keys fall back to their defaults.
///
/// # Errors
/// * `ConfigError::Io` - file cannot be read
/// * `ConfigError::TomlError` - invalid TOML
/// * `ConfigError::Invalid` - values out of range
pub fn load_config(path: impl AsRef<Path>) -> Result<AnalysisConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: AnalysisConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
