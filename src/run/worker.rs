//! One worker's trace through the full pipeline.

use crate::aggregator::classifier::classify_steps;
use crate::aggregator::normalizer::{normalize_steps, StepMap};
use crate::parser::node::create_nodes;
use crate::parser::schema::{to_tree_map, OperatorTreeMap};
use crate::parser::trace::TracePayload;
use crate::parser::tree_builder::build_trees;
use crate::utils::config::AnalysisConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Everything derived from one worker's trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub worker: String,
    pub operator_trees: OperatorTreeMap,
    #[serde(default, skip_serializing_if = "OperatorTreeMap::is_empty")]
    pub framework_trees: OperatorTreeMap,
    pub steps: StepMap,
}

/// Run one decoded payload through tree assembly, classification and
/// normalization
///
/// **Public** - the per-worker unit of work
///
/// # Arguments
/// * `worker` - worker name the output is keyed by
/// * `payload` - decoded trace
/// * `config` - analysis config
///
/// # Returns
/// Trees and normalized steps; empty maps when the trace holds nothing usable
pub fn process_payload(worker: &str, payload: &TracePayload, config: &AnalysisConfig) -> WorkerOutput {
    let start_time = Instant::now();

    debug!("[{}] Step 1/4: Creating nodes from {} records", worker, payload.events.len());
    let nodes = create_nodes(payload);

    debug!("[{}] Step 2/4: Building thread trees from {} nodes", worker, nodes.len());
    let built = build_trees(nodes);
    let operator_trees = to_tree_map(&built.trees);
    let framework_trees = to_tree_map(&built.framework_trees);

    debug!("[{}] Step 3/4: Classifying {} thread trees", worker, operator_trees.len());
    let classified = classify_steps(&operator_trees, &config.markers);

    debug!("[{}] Step 4/4: Normalizing {} steps", worker, classified.len());
    let steps = normalize_steps(&classified, config);

    debug!(
        "[{}] Processed in {:.2}ms",
        worker,
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    WorkerOutput {
        worker: worker.to_string(),
        operator_trees,
        framework_trees,
        steps,
    }
}
