//! Build per-step DAGs from normalized role nodes.
//!
//! Nodes are created in pass order (forward, loss, backward with their
//! all-reduce, optimizer, broadcast) and linked by a fixed edge policy:
//!
//! ```text
//! [bcast] -> F1 -> F2 -> L -> B1 -> A1 -> B2 -> O
//!                                \____________^   (B without all-reduce)
//! ```

use super::schema::{DagEdge, DagMap, DagNode, EdgeKind, Lane, StepDag};
use crate::aggregator::normalizer::{StepMap, TrimmedNode};
use crate::aggregator::roles::Role;
use crate::aggregator::step::{Category, StepRecord};
use crate::utils::config::AnalysisConfig;
use log::debug;

/// Per-step node factory; ids restart at zero for every step
struct DagBuilder {
    next_id: usize,
    clamp_negative_durations: bool,
    dag: StepDag,
}

impl DagBuilder {
    fn new(clamp_negative_durations: bool) -> Self {
        Self {
            next_id: 0,
            clamp_negative_durations,
            dag: StepDag::default(),
        }
    }

    fn add_node(&mut self, label: &str, category: Category, start_time: f64, end_time: f64) -> String {
        let (prefix, lane) = match category {
            Category::Computation => ("comp", Lane::Top),
            Category::Communication => ("comm", Lane::Bottom),
        };
        let id = format!("{}_{}", prefix, self.next_id);
        self.next_id += 1;

        let mut dur = end_time - start_time;
        if self.clamp_negative_durations {
            dur = dur.max(0.0);
        }

        self.dag.nodes.push(DagNode {
            id: id.clone(),
            label: label.to_string(),
            category,
            lane,
            start_time,
            end_time,
            dur,
        });
        id
    }

    fn add_role_node(&mut self, node: &TrimmedNode) -> String {
        self.add_node(&node.name, Category::Computation, node.start_time, node.end_time)
    }

    /// One communication node spanning every interval in `nodes`
    fn add_merged_node(&mut self, label: &str, nodes: &[TrimmedNode]) -> Option<String> {
        let start = nodes.iter().map(|n| n.start_time).min_by(f64::total_cmp)?;
        let end = nodes.iter().map(|n| n.end_time).max_by(f64::total_cmp)?;
        Some(self.add_node(label, Category::Communication, start, end))
    }

    fn link(&mut self, source: &str, target: &str, kind: EdgeKind) {
        self.dag.edges.push(DagEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        });
    }
}

/// Build the DAG of one normalized step
///
/// **Public** - edge order: broadcast, forward chain, forward->loss,
/// loss->backward, backward chain (through all-reduce), loss->optimizer
pub fn synthesize_step(record: &StepRecord<TrimmedNode>, config: &AnalysisConfig) -> StepDag {
    let markers = &config.markers;
    let mut builder = DagBuilder::new(config.clamp_negative_durations);

    let forwards: Vec<String> = record
        .forward_nodes()
        .iter()
        .map(|n| builder.add_role_node(n))
        .collect();

    let loss = record.loss.as_ref().map(|n| builder.add_role_node(n));

    // (backward id, merged all-reduce id)
    let mut backwards: Vec<(String, Option<String>)> = Vec::new();
    for node in record.backward_nodes() {
        let id = builder.add_role_node(node);
        let all_reduce = node
            .children
            .as_deref()
            .and_then(|children| builder.add_merged_node(markers.pattern(Role::AllReduce), children));
        backwards.push((id, all_reduce));
    }

    let optimizer = record.optimizer.as_ref().map(|n| builder.add_role_node(n));

    let broadcast = builder.add_merged_node(markers.pattern(Role::Broadcast), &record.broadcasts);

    if let (Some(bcast), Some(first)) = (&broadcast, forwards.first()) {
        builder.link(bcast, first, EdgeKind::BcastToFirstForward);
    }

    for pair in forwards.windows(2) {
        builder.link(&pair[0], &pair[1], EdgeKind::Seq);
    }

    if let (Some(last), Some(loss)) = (forwards.last(), &loss) {
        builder.link(last, loss, EdgeKind::Seq);
    }

    if let (Some(loss), Some((first, _))) = (&loss, backwards.first()) {
        builder.link(loss, first, EdgeKind::Seq);
    }

    for (index, (backward, all_reduce)) in backwards.iter().enumerate() {
        let next = backwards.get(index + 1).map(|(id, _)| id);

        match all_reduce {
            Some(all_reduce) => {
                builder.link(backward, all_reduce, EdgeKind::BackwardToAllreduce);
                if let Some(next) = next {
                    builder.link(all_reduce, next, EdgeKind::AllreduceToNextBackward);
                } else if let Some(optimizer) = &optimizer {
                    builder.link(all_reduce, optimizer, EdgeKind::AllreduceToOptimizer);
                }
            }
            None => {
                if let Some(next) = next {
                    builder.link(backward, next, EdgeKind::Seq);
                } else if let Some(optimizer) = &optimizer {
                    builder.link(backward, optimizer, EdgeKind::ToOptimizer);
                }
            }
        }
    }

    if backwards.is_empty() {
        if let (Some(loss), Some(optimizer)) = (&loss, &optimizer) {
            builder.link(loss, optimizer, EdgeKind::Seq);
        }
    }

    builder.dag
}

/// Build the DAG of every step
///
/// **Public** - main entry point for DAG synthesis
pub fn synthesize(steps: &StepMap, config: &AnalysisConfig) -> DagMap {
    let dags: DagMap = steps
        .iter()
        .map(|(step, record)| (*step, synthesize_step(record, config)))
        .collect();

    debug!(
        "Synthesized {} step graphs ({} edges)",
        dags.len(),
        dags.values().map(|d| d.edges.len()).sum::<usize>()
    );
    dags
}
