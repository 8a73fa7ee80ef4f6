//! Operation normalization of classified steps.
//!
//! Stage order matters and is fixed:
//! 1. expand each backward node into its per-layer nodes
//! 2. reduce every backward layer to its all-reduce descendants
//! 3. rebuild the forward role from the backward layer names
//! 4. drop loss structure
//! 5. trim every node to a named interval in display units
//!
//! Trimming is last because it throws away the structure the other stages
//! walk. A separate read path (`step_view`) prettifies names and rescales
//! each step, always on a copy.

use super::roles::{MarkerTable, Role};
use super::step::{Category, RoleNodes, StepAccumulator, StepRecord};
use crate::parser::schema::TreeNode;
use crate::utils::config::AnalysisConfig;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const BACKWARD_SUFFIX: &str = ".backward";
const MODULE_PREFIX: &str = "nn.Module: ";
const AUTOGRAD_EVALUATE_PREFIX: &str = "autograd::engine::evaluate_function: ";

/// Step number -> normalized role nodes
pub type StepMap = BTreeMap<u64, StepRecord<TrimmedNode>>;

/// A role node reduced to a named, categorized interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimmedNode {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub dur: f64,
    pub category: Category,
    /// Only backward nodes keep children (their all-reduce descendants)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TrimmedNode>>,
}

/// Reduce a node to a `TrimmedNode`
///
/// Implemented for raw tree nodes (converting units) and for already-trimmed
/// nodes (recomputing derived fields only), so trimming normalized output
/// again changes nothing.
pub trait Trim {
    fn trim(&self, config: &AnalysisConfig, keep_children: bool) -> TrimmedNode;
}

impl Trim for TreeNode {
    fn trim(&self, config: &AnalysisConfig, keep_children: bool) -> TrimmedNode {
        let children = keep_children.then(|| {
            let mut trimmed: Vec<TrimmedNode> = self
                .children
                .iter()
                .map(|child| child.trim(config, false))
                .collect();
            sort_by_start(&mut trimmed);
            trimmed
        });

        interval(
            &self.name,
            self.start_time / config.time_divisor,
            self.end_time / config.time_divisor,
            children,
            config,
        )
    }
}

impl Trim for TrimmedNode {
    fn trim(&self, config: &AnalysisConfig, keep_children: bool) -> TrimmedNode {
        let children = if keep_children {
            self.children.as_ref().map(|children| {
                let mut trimmed: Vec<TrimmedNode> =
                    children.iter().map(|c| c.trim(config, false)).collect();
                sort_by_start(&mut trimmed);
                trimmed
            })
        } else {
            None
        };

        interval(&self.name, self.start_time, self.end_time, children, config)
    }
}

/// **Private** - build a trimmed node, applying the clamp policy
fn interval(
    name: &str,
    start_time: f64,
    mut end_time: f64,
    children: Option<Vec<TrimmedNode>>,
    config: &AnalysisConfig,
) -> TrimmedNode {
    if config.clamp_negative_durations && end_time < start_time {
        debug!(
            "Clamping '{}': end {} precedes start {}",
            name, end_time, start_time
        );
        end_time = start_time;
    }

    let category = if config.is_communication(name) {
        Category::Communication
    } else {
        Category::Computation
    };

    TrimmedNode {
        name: name.to_string(),
        start_time,
        end_time,
        dur: end_time - start_time,
        category,
        children,
    }
}

fn sort_by_start(nodes: &mut [TrimmedNode]) {
    nodes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

/// Trim every role of one record
///
/// **Public** - the last normalization stage; also the re-trim entry point
pub fn trim_record<T: Trim>(record: &StepRecord<T>, config: &AnalysisConfig) -> StepRecord<TrimmedNode> {
    let trim_list = |nodes: &[T], keep_children: bool| {
        let mut trimmed: Vec<TrimmedNode> = nodes
            .iter()
            .map(|n| n.trim(config, keep_children))
            .collect();
        sort_by_start(&mut trimmed);
        trimmed
    };

    StepRecord {
        broadcasts: trim_list(record.broadcasts.as_slice(), false),
        forward: record.forward.as_ref().map(|forward| match forward {
            RoleNodes::Single(node) => RoleNodes::Single(node.trim(config, false)),
            RoleNodes::Many(nodes) => RoleNodes::Many(trim_list(nodes.as_slice(), false)),
        }),
        loss: record.loss.as_ref().map(|n| n.trim(config, false)),
        backward: record
            .backward
            .as_ref()
            .map(|backward| RoleNodes::Many(trim_list(backward.as_slice(), true))),
        optimizer: record.optimizer.as_ref().map(|n| n.trim(config, false)),
    }
}

/// Per-layer backward nodes of one backward role node
///
/// **Public** - a wrapper whose first child has children expands to those
/// grandchildren; anything else is its own single layer
pub fn expand_backward_layers(backward: &TreeNode) -> Vec<TreeNode> {
    match backward.children.first() {
        Some(first) if !first.children.is_empty() => first.children.clone(),
        _ => vec![backward.clone()],
    }
}

/// Replace a node's children with the flat list of its all-reduce descendants
pub fn keep_all_reduce_descendants(node: &TreeNode, markers: &MarkerTable) -> TreeNode {
    let all_reduces: Vec<TreeNode> = node
        .descendants_matching(|n| markers.matches(Role::AllReduce, &n.name))
        .into_iter()
        .map(TreeNode::without_children)
        .collect();

    TreeNode {
        children: all_reduces,
        ..node.without_children()
    }
}

/// Forward layer name targeted by a backward node name
///
/// `nn.Module: Linear_1.backward` and
/// `autograd::engine::evaluate_function: nn.Module: Linear_1.backward`
/// both target `Linear_1`.
pub fn clean_backward_name(name: &str) -> String {
    let name = name.strip_suffix(BACKWARD_SUFFIX).unwrap_or(name);
    let name = name.strip_prefix(AUTOGRAD_EVALUATE_PREFIX).unwrap_or(name);
    let name = name.strip_prefix(MODULE_PREFIX).unwrap_or(name);
    name.to_string()
}

/// Forward layers matching the backward layers, in forward order
///
/// **Public** - returns `None` when no backward layer carries a layer name,
/// leaving the forward role as it was
pub fn reconcile_forward(
    forward: &RoleNodes<TreeNode>,
    backward_layers: &[TreeNode],
) -> Option<RoleNodes<TreeNode>> {
    let forward_root = forward.first()?;

    // Backward layers are discovered in reverse order of the forward pass
    let layers: Vec<TreeNode> = backward_layers
        .iter()
        .rev()
        .filter(|layer| layer.name.ends_with(BACKWARD_SUFFIX))
        .map(|layer| {
            let target = clean_backward_name(&layer.name);
            let matched = forward.as_slice().iter().find_map(|root| {
                root.find_depth_first(|n| {
                    n.name.strip_prefix(MODULE_PREFIX).unwrap_or(&n.name) == target
                })
            });

            match matched {
                Some(node) => node.without_children(),
                None => {
                    debug!("No forward layer named '{}', using a placeholder", target);
                    TreeNode {
                        name: format!("{}{}", MODULE_PREFIX, target),
                        ..forward_root.without_children()
                    }
                }
            }
        })
        .collect();

    RoleNodes::from_vec(layers)
}

/// Normalize one classified step
///
/// **Public** - stages 1 to 5 for a single record
pub fn normalize_record(record: &StepRecord<TreeNode>, config: &AnalysisConfig) -> StepRecord<TrimmedNode> {
    let markers = &config.markers;
    let mut work = record.clone();

    if let Some(backward) = work.backward.take() {
        let layers: Vec<TreeNode> = backward
            .as_slice()
            .iter()
            .flat_map(expand_backward_layers)
            .map(|layer| keep_all_reduce_descendants(&layer, markers))
            .collect();

        if let Some(forward) = work.forward.as_ref() {
            if let Some(reconciled) = reconcile_forward(forward, &layers) {
                work.forward = Some(reconciled);
            }
        }

        work.backward = Some(RoleNodes::Many(layers));
    }

    if let Some(loss) = work.loss.as_mut() {
        loss.children.clear();
    }

    trim_record(&work, config)
}

/// Normalize every classified step of one trace
///
/// **Public** - main entry point for operation normalization
pub fn normalize_steps(steps: &StepAccumulator<TreeNode>, config: &AnalysisConfig) -> StepMap {
    let normalized: StepMap = steps
        .iter()
        .map(|(step, record)| (step, normalize_record(record, config)))
        .collect();

    debug!("Normalized {} steps", normalized.len());
    normalized
}

/// Trim already-normalized steps again (no unit conversion)
pub fn retrim_steps(steps: &StepMap, config: &AnalysisConfig) -> StepMap {
    steps
        .iter()
        .map(|(step, record)| (*step, trim_record(record, config)))
        .collect()
}

/// Compiled display-name rewrites
struct NamePrettifier {
    rules: Vec<(Regex, &'static str)>,
}

const PRETTIFY_RULES: &[(&str, &str)] = &[
    (r"\bnn\.Module\s*:\s*", ""),
    (r"^(?:aten|autograd|torch)::", ""),
    (r"^Sequential_(\d+)", "Seq$1"),
    (r"^Optimizer(?:[.#].*)?$", "Optimizer"),
];

impl NamePrettifier {
    fn new() -> Result<Self, regex::Error> {
        let rules = PRETTIFY_RULES
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    fn apply(&self, name: &str) -> String {
        let mut pretty = name.trim().to_string();
        for (pattern, replacement) in &self.rules {
            pretty = pattern.replace_all(&pretty, *replacement).trim().to_string();
        }
        pretty
    }
}

/// Display name for a node
///
/// `nn.Module: Sequential_0` becomes `Seq0`, `aten::linear` becomes
/// `linear` and any `Optimizer.step#...` becomes `Optimizer`.
pub fn prettify_name(name: &str) -> String {
    static PRETTIFIER: OnceLock<Option<NamePrettifier>> = OnceLock::new();

    let prettifier = PRETTIFIER.get_or_init(|| match NamePrettifier::new() {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Display-name rules failed to compile: {}", e);
            None
        }
    });

    match prettifier {
        Some(p) => p.apply(name),
        None => name.to_string(),
    }
}

/// **Private** - every node of a record, children included
fn for_each_node_mut(record: &mut StepRecord<TrimmedNode>, f: &mut dyn FnMut(&mut TrimmedNode)) {
    let mut visit = |node: &mut TrimmedNode| {
        f(node);
        if let Some(children) = node.children.as_mut() {
            for child in children {
                f(child);
            }
        }
    };

    for node in record.broadcasts.iter_mut() {
        visit(node);
    }
    if let Some(forward) = record.forward.as_mut() {
        forward.as_mut_slice().iter_mut().for_each(&mut visit);
    }
    if let Some(loss) = record.loss.as_mut() {
        visit(loss);
    }
    if let Some(backward) = record.backward.as_mut() {
        backward.as_mut_slice().iter_mut().for_each(&mut visit);
    }
    if let Some(optimizer) = record.optimizer.as_mut() {
        visit(optimizer);
    }
}

/// Map a step's time range onto `[0, span]`
///
/// **Public** - a step with zero or negative extent is left unchanged
pub fn rescale_record(record: &mut StepRecord<TrimmedNode>, span: f64) {
    let mut min_start = f64::INFINITY;
    let mut max_end = f64::NEG_INFINITY;
    for_each_node_mut(record, &mut |node| {
        min_start = min_start.min(node.start_time);
        max_end = max_end.max(node.end_time);
    });

    let extent = max_end - min_start;
    if !(extent > 0.0) {
        return;
    }

    let scale = span / extent;
    for_each_node_mut(record, &mut |node| {
        node.start_time = (node.start_time - min_start) * scale;
        node.end_time = (node.end_time - min_start) * scale;
        node.dur = node.end_time - node.start_time;
    });
}

/// Display copy of a step map: prettified names, each step rescaled
///
/// **Public** - never touches `steps`
pub fn step_view(steps: &StepMap, config: &AnalysisConfig) -> StepMap {
    let mut view = steps.clone();
    for record in view.values_mut() {
        for_each_node_mut(record, &mut |node| node.name = prettify_name(&node.name));
        rescale_record(record, config.normalized_span);
    }
    view
}
