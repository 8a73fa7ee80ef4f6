//! Trace parsing and tree assembly.
//!
//! This module handles:
//! - Decoding raw trace JSON into records
//! - Mapping records to typed nodes
//! - Correlating runtime/device work and nesting per-thread call trees
//! - Defining the operator-tree output schema

pub mod node;
pub mod schema;
pub mod trace;
pub mod tree_builder;

// Re-export main types
pub use node::{create_node, create_nodes, NodeKind, OperatorNode};
pub use schema::{to_tree_map, OperatorTreeMap, TreeNode};
pub use trace::{EventType, RawEvent, TracePayload};
pub use tree_builder::{build_trees, nest_by_containment, BuiltTrees};
