//! Report JSON schema definitions.
//!
//! This module defines the structure of the JSON files we write to disk.
//! Schema is versioned to allow future evolution.

use crate::aggregator::normalizer::StepMap;
use crate::aggregator::summary::TimingSummary;
use crate::dag::schema::DagMap;
use crate::parser::schema::OperatorTreeMap;
use crate::utils::config::SCHEMA_VERSION;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Everything derived from one worker trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Schema version for compatibility checking
    pub version: String,

    pub run: String,

    pub worker: String,

    /// RFC 3339 timestamp of when the report was generated
    pub generated_at: String,

    /// Thread id -> call tree
    pub operator_trees: OperatorTreeMap,

    /// Thread id -> framework-profile tree (lightning traces only)
    #[serde(default, skip_serializing_if = "OperatorTreeMap::is_empty")]
    pub framework_trees: OperatorTreeMap,

    /// Step number -> role nodes
    pub steps: StepMap,

    /// Step number -> overlap graph
    pub dag: DagMap,
}

impl WorkerReport {
    pub fn new(
        run: impl Into<String>,
        worker: impl Into<String>,
        operator_trees: OperatorTreeMap,
        steps: StepMap,
        dag: DagMap,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            run: run.into(),
            worker: worker.into(),
            generated_at: Utc::now().to_rfc3339(),
            operator_trees,
            framework_trees: OperatorTreeMap::new(),
            steps,
            dag,
        }
    }

    pub fn with_framework_trees(mut self, framework_trees: OperatorTreeMap) -> Self {
        self.framework_trees = framework_trees;
        self
    }
}

/// Run-level report: which workers were loaded and how long collectives took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub version: String,
    pub run: String,
    pub generated_at: String,
    pub workers: Vec<String>,
    /// Slot key (`broadcast_0`, `all_reduce_2`, ...) -> mean duration
    pub communication_timing: TimingSummary,
}

impl RunReport {
    pub fn new(run: impl Into<String>, workers: Vec<String>, communication_timing: TimingSummary) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            run: run.into(),
            generated_at: Utc::now().to_rfc3339(),
            workers,
            communication_timing,
        }
    }
}
