//! Step-phase classification.
//!
//! Per-thread trees are visited in order of their earliest event and each
//! thread is read according to the phase the walk is in:
//!
//! ```text
//! Main ──(first tree)──> BackwardPhase ──(thread with backward/optimizer)──> CommunicationPhase
//! ```
//!
//! The main thread contributes forward and loss per profiler step, backward
//! threads contribute backward and optimizer nodes under the step they follow,
//! and communication threads attach collectives to the steps that issued them.

use super::roles::{MarkerTable, Role};
use super::step::{push_role_node, RoleNodes, StepAccumulator};
use crate::parser::schema::{OperatorTreeMap, TreeNode};
use crate::utils::config::{CALL_TREE_ROOT, PROFILER_STEP_PATTERN};
use log::{debug, warn};
use regex::Regex;
use std::sync::OnceLock;

/// Where the walk over thread trees currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Main,
    BackwardPhase,
    CommunicationPhase,
}

/// Step number of a profiler-step marker name, if it is one
///
/// **Public** - `"ProfilerStep#7"` yields `Some(7)`
pub fn extract_step_number(name: &str) -> Option<u64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = PATTERN.get_or_init(|| match Regex::new(PROFILER_STEP_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid profiler step pattern: {}", e);
            None
        }
    });

    pattern
        .as_ref()?
        .captures(name)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Walks thread trees and fills per-step role records
///
/// **Public** - one instance per trace
pub struct StepClassifier<'a> {
    markers: &'a MarkerTable,
    phase: Phase,
    current_step: Option<u64>,
    steps: StepAccumulator<TreeNode>,
}

impl<'a> StepClassifier<'a> {
    pub fn new(markers: &'a MarkerTable) -> Self {
        Self {
            markers,
            phase: Phase::Main,
            current_step: None,
            steps: StepAccumulator::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Feed one thread's root; non-root trees are skipped
    pub fn visit(&mut self, root: &TreeNode) {
        if root.name != CALL_TREE_ROOT {
            debug!("Skipping tree rooted at '{}'", root.name);
            return;
        }

        match self.phase {
            Phase::Main => {
                self.collect_main(root);
                self.phase = Phase::BackwardPhase;
            }
            Phase::BackwardPhase => {
                if self.collect_backward(root) {
                    self.phase = Phase::CommunicationPhase;
                }
            }
            Phase::CommunicationPhase => self.collect_communication(root),
        }
    }

    pub fn finish(self) -> StepAccumulator<TreeNode> {
        self.steps
    }

    /// **Private** - forward and loss of every profiler step on the main thread
    fn collect_main(&mut self, root: &TreeNode) {
        for child in &root.children {
            let Some(step) = extract_step_number(&child.name) else {
                continue;
            };

            let forward = child
                .find_depth_first(|n| self.markers.matches(Role::Forward, &n.name))
                .cloned();
            let loss = child
                .find_depth_first(|n| self.markers.matches(Role::Loss, &n.name))
                .cloned();

            if forward.is_none() && loss.is_none() {
                debug!("Step {} has neither forward nor loss", step);
                continue;
            }

            let record = self.steps.ensure(step);
            if let Some(node) = forward {
                record.forward = Some(RoleNodes::Single(node));
            }
            if let Some(node) = loss {
                record.loss = Some(node);
            }
        }
    }

    /// **Private** - backward and optimizer nodes; true if the thread had any
    fn collect_backward(&mut self, root: &TreeNode) -> bool {
        let mut contributed = false;

        for child in &root.children {
            if let Some(step) = extract_step_number(&child.name) {
                self.current_step = Some(step);
                continue;
            }

            let role = if self.markers.matches(Role::Backward, &child.name) {
                Role::Backward
            } else if self.markers.matches(Role::Optimizer, &child.name) {
                Role::Optimizer
            } else {
                continue;
            };
            contributed = true;

            let Some(step) = self.current_step else {
                debug!("'{}' appears before any profiler step", child.name);
                continue;
            };

            let record = self.steps.ensure(step);
            match role {
                Role::Backward => push_role_node(&mut record.backward, child.clone()),
                _ => record.optimizer = Some(child.clone()),
            }
        }

        contributed
    }

    /// **Private** - attach broadcasts and claim all-reduce placeholders
    fn collect_communication(&mut self, root: &TreeNode) {
        for child in &root.children {
            if self.markers.matches(Role::Broadcast, &child.name) {
                self.attach_broadcast(child);
            } else if self.markers.matches(Role::AllReduce, &child.name) {
                self.claim_all_reduce(child);
            }
        }
    }

    /// Append a broadcast to every step whose forward subtree issued it
    ///
    /// **Private** - searches all collected steps, not only the nearest one
    fn attach_broadcast(&mut self, broadcast: &TreeNode) {
        let Some(ext) = broadcast.external_id else {
            return;
        };

        let mut attached = 0;
        for (_, record) in self.steps.iter_mut() {
            let issued_here = record
                .forward_nodes()
                .iter()
                .any(|forward| forward.any_breadth_first(|n| n.external_id == Some(ext)));

            if issued_here {
                record.broadcasts.push(broadcast.clone());
                attached += 1;
            }
        }

        if attached == 0 {
            debug!("Broadcast with external id {} matched no step", ext);
        }
    }

    /// Merge an all-reduce into the first matching placeholder of any step
    ///
    /// **Private** - locate first, then mutate; later placeholders stay untouched
    fn claim_all_reduce(&mut self, all_reduce: &TreeNode) {
        let Some(ext) = all_reduce.external_id else {
            return;
        };

        let located = self.steps.iter().find_map(|(step, record)| {
            record
                .backward_nodes()
                .iter()
                .enumerate()
                .find_map(|(index, backward)| {
                    backward
                        .path_breadth_first(|n| {
                            n.external_id == Some(ext)
                                && self.markers.matches(Role::AllReduce, &n.name)
                        })
                        .map(|path| (step, index, path))
                })
        });

        let Some((step, index, path)) = located else {
            debug!("All-reduce with external id {} matched no step", ext);
            return;
        };

        let target = self
            .steps
            .get_mut(step)
            .and_then(|record| record.backward.as_mut())
            .and_then(|backward| backward.as_mut_slice().get_mut(index))
            .and_then(|backward| backward.node_at_mut(&path));

        if let Some(node) = target {
            node.merge_from(all_reduce);
        }
    }
}

/// Classify every thread tree of one trace
///
/// **Public** - main entry point for step-phase classification
///
/// # Arguments
/// * `trees` - per-thread roots of one trace
/// * `markers` - role marker table
///
/// # Returns
/// Step records in the order steps were first seen (empty when nothing matched)
pub fn classify_steps(trees: &OperatorTreeMap, markers: &MarkerTable) -> StepAccumulator<TreeNode> {
    // Stable sort keeps thread-id order among trees starting together
    let mut roots: Vec<&TreeNode> = trees.values().collect();
    roots.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut classifier = StepClassifier::new(markers);
    for root in roots {
        classifier.visit(root);
    }

    debug!(
        "Classified {} steps, final phase {:?}",
        classifier.steps.len(),
        classifier.phase
    );

    classifier.finish()
}
