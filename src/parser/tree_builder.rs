//! Assemble flat typed nodes into per-thread call trees.
//!
//! Three passes over one trace:
//! 1. Correlate device work to runtime launches (correlation id), buffering
//!    whichever side shows up first.
//! 2. Attribute runtime launches to operators (external id).
//! 3. Nest operators of each thread by time containment under a synthetic root.
//!
//! Nothing here fails: unresolved correlations and unmatched external ids are
//! logged and the affected nodes are set aside.

use super::node::OperatorNode;
use super::trace::EventType;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// External id meaning "launched outside of any operator"
pub const UNOWNED_EXTERNAL_ID: i64 = 0;

/// Result of tree assembly for one trace
#[derive(Debug, Clone, Default)]
pub struct BuiltTrees {
    /// Thread id -> synthetic root
    pub trees: BTreeMap<i64, OperatorNode>,

    /// Thread id -> synthetic root, framework-profile spans only
    pub framework_trees: BTreeMap<i64, OperatorNode>,

    /// Runtime launches under the "unowned" external id, by launching thread
    pub unowned_runtimes: BTreeMap<i64, Vec<OperatorNode>>,

    /// Kernels whose runtime launch never appeared; leftover memcpy/memset
    /// nodes are dropped
    pub stale_devices: Vec<OperatorNode>,

    /// Runtime nodes dropped because no operator claimed their external id
    pub unmatched_runtimes: usize,
}

/// Correlation bookkeeping while nodes stream in
///
/// Runtime nodes live in `runtimes` until the end of the pass so that late
/// device nodes can still be attached to them by index.
#[derive(Default)]
struct Correlator {
    runtimes: Vec<Option<OperatorNode>>,
    runtime_by_correlation: HashMap<i64, usize>,
    runtimes_by_external: HashMap<i64, Vec<usize>>,
    pending_devices: HashMap<i64, Vec<OperatorNode>>,
}

impl Correlator {
    fn add_device(&mut self, device: OperatorNode) {
        let Some(corr) = device.correlation_id else {
            debug!("Device node '{}' has no correlation id", device.name);
            self.pending_devices.entry(-1).or_default().push(device);
            return;
        };

        match self.runtime_by_correlation.get(&corr).copied() {
            Some(index) => {
                if let Some(Some(runtime)) = self.runtimes.get_mut(index) {
                    runtime.push_device(device);
                }
            }
            None => self.pending_devices.entry(corr).or_default().push(device),
        }
    }

    fn add_runtime(&mut self, mut runtime: OperatorNode) {
        if let Some(corr) = runtime.correlation_id {
            for device in self.pending_devices.remove(&corr).unwrap_or_default() {
                runtime.push_device(device);
            }
        }

        let index = self.runtimes.len();
        if let Some(corr) = runtime.correlation_id {
            self.runtime_by_correlation.insert(corr, index);
        }
        let external = runtime.external_id.unwrap_or(UNOWNED_EXTERNAL_ID);
        self.runtimes_by_external.entry(external).or_default().push(index);
        self.runtimes.push(Some(runtime));
    }

    /// Hand over every runtime indexed under `external_id`
    fn claim(&mut self, external_id: i64) -> Vec<OperatorNode> {
        self.runtimes_by_external
            .remove(&external_id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|index| self.runtimes.get_mut(index).and_then(Option::take))
            .collect()
    }
}

/// Build per-thread trees from the typed nodes of one trace
///
/// **Public** - main entry point for tree assembly
///
/// # Arguments
/// * `nodes` - every typed node of the trace, in any order
///
/// # Returns
/// Per-thread trees plus the nodes that could not be placed
pub fn build_trees(nodes: Vec<OperatorNode>) -> BuiltTrees {
    let started = Instant::now();

    let mut correlator = Correlator::default();
    let mut ops_by_thread: BTreeMap<i64, Vec<OperatorNode>> = BTreeMap::new();
    let mut framework_by_thread: BTreeMap<i64, Vec<OperatorNode>> = BTreeMap::new();

    for node in nodes {
        if node.is_device() {
            correlator.add_device(node);
        } else if node.is_runtime() {
            correlator.add_runtime(node);
        } else if node.is_framework_profile() {
            framework_by_thread.entry(node.tid).or_default().push(node);
        } else {
            ops_by_thread.entry(node.tid).or_default().push(node);
        }
    }

    // Attribute runtime launches to the operators that issued them
    for ops in ops_by_thread.values_mut() {
        for op in ops.iter_mut() {
            match op.external_id {
                Some(ext) if ext != UNOWNED_EXTERNAL_ID => {
                    let runtimes = correlator.claim(ext);
                    op.runtimes.extend(runtimes);
                }
                _ => {}
            }
        }
    }

    let mut built = BuiltTrees::default();

    for runtime in correlator.claim(UNOWNED_EXTERNAL_ID) {
        built
            .unowned_runtimes
            .entry(runtime.tid)
            .or_default()
            .push(runtime);
    }
    if !built.unowned_runtimes.is_empty() {
        debug!(
            "{} runtime nodes carry the unowned external id",
            built.unowned_runtimes.values().map(Vec::len).sum::<usize>()
        );
    }

    let leftover: Vec<i64> = correlator.runtimes_by_external.keys().copied().collect();
    for ext in leftover {
        let count = correlator.claim(ext).len();
        if count > 0 {
            warn!(
                "{} runtime nodes with external id {} don't correlate to any operator",
                count, ext
            );
            built.unmatched_runtimes += count;
        }
    }

    let (kernels, other): (Vec<OperatorNode>, Vec<OperatorNode>) = correlator
        .pending_devices
        .into_values()
        .flatten()
        .partition(|device| device.event_type == EventType::Kernel);
    if !other.is_empty() {
        debug!("Dropping {} uncorrelated memcpy/memset nodes", other.len());
    }
    built.stale_devices = kernels;
    if !built.stale_devices.is_empty() {
        warn!(
            "{} kernels never matched a runtime launch",
            built.stale_devices.len()
        );
    }

    for (tid, ops) in ops_by_thread {
        built.trees.insert(tid, nest_by_containment(tid, ops));
    }
    for (tid, ops) in framework_by_thread {
        built.framework_trees.insert(tid, nest_by_containment(tid, ops));
    }

    debug!(
        "Built {} thread trees in {:.2}ms",
        built.trees.len(),
        started.elapsed().as_secs_f64() * 1000.0
    );

    built
}

/// Nest the nodes of one thread under a synthetic root
///
/// **Public** - the containment algorithm on its own
///
/// A node becomes a child of the innermost open node it starts inside. A node
/// that ends past that node is logged and still nested there; it opens its
/// own scope like any other node, so the nodes it contains nest under it.
pub fn nest_by_containment(tid: i64, mut nodes: Vec<OperatorNode>) -> OperatorNode {
    // Outer intervals first when two nodes start together
    nodes.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(b.end_time.total_cmp(&a.end_time))
    });

    let mut root = OperatorNode::root(tid);
    root.start_time = nodes.first().map(|n| n.start_time).unwrap_or(0.0);
    root.end_time = nodes
        .iter()
        .map(|n| n.end_time)
        .max_by(f64::total_cmp)
        .unwrap_or(root.start_time);

    // Open scopes; the root at the bottom never closes
    let mut stack: Vec<OperatorNode> = vec![root];

    for node in nodes {
        while stack.len() > 1 {
            let top = &stack[stack.len() - 1];
            if node.start_time < top.end_time {
                break;
            }
            close_scope(&mut stack);
        }

        let top_index = stack.len() - 1;
        let top = &stack[top_index];
        if top_index > 0 && node.end_time > top.end_time {
            warn!(
                "Thread {}: '{}' [{}, {}] overlaps '{}' [{}, {}]",
                tid, node.name, node.start_time, node.end_time, top.name, top.start_time, top.end_time
            );
        }
        stack.push(node);
    }

    while stack.len() > 1 {
        close_scope(&mut stack);
    }

    stack.pop().unwrap_or_else(|| OperatorNode::root(tid))
}

/// **Private** - pop the innermost scope into its parent
fn close_scope(stack: &mut Vec<OperatorNode>) {
    if let Some(finished) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(finished);
        }
    }
}
