//! Compute/communication overlap graphs.
//!
//! One DAG per training step, built from normalized role nodes.

pub mod schema;
pub mod synthesizer;

pub use schema::{DagEdge, DagMap, DagNode, EdgeKind, Lane, StepDag};
pub use synthesizer::{synthesize, synthesize_step};
