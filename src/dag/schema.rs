//! DAG output schema.

use crate::aggregator::step::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Visual row of a DAG node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Computation
    Top,
    /// Communication
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    /// Unique within one step (`comp_0`, `comm_3`, ...)
    pub id: String,
    pub label: String,
    pub category: Category,
    pub lane: Lane,
    pub start_time: f64,
    pub end_time: f64,
    pub dur: f64,
}

/// Fixed vocabulary of edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Seq,
    BcastToFirstForward,
    BackwardToAllreduce,
    AllreduceToNextBackward,
    AllreduceToOptimizer,
    ToOptimizer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Graph of one training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StepDag {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
}

impl StepDag {
    pub fn node(&self, id: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// `(source label, target label)` of every edge, in edge order
    pub fn labelled_edges(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .filter_map(|edge| {
                let source = self.node(&edge.source)?;
                let target = self.node(&edge.target)?;
                Some((source.label.clone(), target.label.clone()))
            })
            .collect()
    }
}

/// Step number -> step graph
pub type DagMap = BTreeMap<u64, StepDag>;
