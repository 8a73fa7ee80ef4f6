//! Operator-tree JSON schema.
//!
//! This is the shape the rest of the pipeline works on once trees are built:
//! plain named intervals with children, cheap to clone and to serialize.
//! Searches over it use explicit stacks and queues so that pathological
//! nesting depth cannot overflow the call stack.

use super::node::OperatorNode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Thread id -> synthetic root node
pub type OperatorTreeMap = BTreeMap<i64, TreeNode>;

/// One node of a serialized operator tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TreeNode {
    #[serde(default)]
    pub name: String,

    /// Event type tag (`Operator`, `Module`, `ProfilerStep`, ...)
    #[serde(rename = "type", default)]
    pub node_type: String,

    #[serde(default)]
    pub children: Vec<TreeNode>,

    #[serde(default)]
    pub start_time: f64,

    #[serde(default)]
    pub end_time: f64,

    #[serde(default)]
    pub external_id: Option<i64>,
}

impl From<&OperatorNode> for TreeNode {
    fn from(node: &OperatorNode) -> Self {
        Self {
            name: node.name.clone(),
            node_type: node.event_type.as_str().to_string(),
            children: node.children.iter().map(TreeNode::from).collect(),
            start_time: node.start_time,
            end_time: node.end_time,
            external_id: node.external_id,
        }
    }
}

impl TreeNode {
    /// Leaf node with the given name and interval
    pub fn leaf(name: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time,
            ..Default::default()
        }
    }

    /// Copy of this node without its children
    pub fn without_children(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// First node (self included) matching `pred`, depth-first, left to right
    pub fn find_depth_first<F>(&self, pred: F) -> Option<&TreeNode>
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if pred(node) {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Every strict descendant matching `pred`, in depth-first pre-order
    pub fn descendants_matching<F>(&self, pred: F) -> Vec<&TreeNode>
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut found = Vec::new();
        let mut stack: Vec<&TreeNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if pred(node) {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// Child-index path to the first node (self included) matching `pred`,
    /// breadth-first
    ///
    /// An empty path means `self` matched.
    pub fn path_breadth_first<F>(&self, pred: F) -> Option<Vec<usize>>
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut queue: VecDeque<(&TreeNode, Vec<usize>)> = VecDeque::new();
        queue.push_back((self, Vec::new()));

        while let Some((node, path)) = queue.pop_front() {
            if pred(node) {
                return Some(path);
            }
            for (index, child) in node.children.iter().enumerate() {
                let mut child_path = path.clone();
                child_path.push(index);
                queue.push_back((child, child_path));
            }
        }
        None
    }

    /// Whether any node (self included) matches `pred`, breadth-first
    pub fn any_breadth_first<F>(&self, pred: F) -> bool
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut queue: VecDeque<&TreeNode> = VecDeque::from([self]);
        while let Some(node) = queue.pop_front() {
            if pred(node) {
                return true;
            }
            queue.extend(node.children.iter());
        }
        false
    }

    /// Follow a child-index path
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Take over every field of `incoming`
    ///
    /// Used when a communication record claims its placeholder inside a
    /// backward subtree: the claimed node becomes the incoming record.
    pub fn merge_from(&mut self, incoming: &TreeNode) {
        self.name = incoming.name.clone();
        self.node_type = incoming.node_type.clone();
        self.children = incoming.children.clone();
        self.start_time = incoming.start_time;
        self.end_time = incoming.end_time;
        self.external_id = incoming.external_id;
    }
}

/// Convert built per-thread roots into the serializable tree map
pub fn to_tree_map(trees: &BTreeMap<i64, OperatorNode>) -> OperatorTreeMap {
    trees
        .iter()
        .map(|(tid, root)| (*tid, TreeNode::from(root)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeNode {
        let mut root = TreeNode::leaf("root", 0.0, 100.0);
        let mut a = TreeNode::leaf("a", 0.0, 50.0);
        a.children.push(TreeNode::leaf("target", 10.0, 20.0));
        let mut b = TreeNode::leaf("target", 60.0, 70.0);
        b.external_id = Some(9);
        root.children = vec![a, b];
        root
    }

    #[test]
    fn test_depth_first_prefers_left_subtree() {
        let tree = sample();
        let found = tree.find_depth_first(|n| n.name == "target").unwrap();
        assert_eq!(found.start_time, 10.0);
    }

    #[test]
    fn test_breadth_first_prefers_shallow() {
        let tree = sample();
        let path = tree.path_breadth_first(|n| n.name == "target").unwrap();
        assert_eq!(path, vec![1]);
        assert!(tree.any_breadth_first(|n| n.external_id == Some(9)));
        assert!(!tree.any_breadth_first(|n| n.external_id == Some(10)));
    }

    #[test]
    fn test_descendants_exclude_self() {
        let mut tree = sample();
        tree.name = "target".to_string();
        let found = tree.descendants_matching(|n| n.name == "target");
        let starts: Vec<f64> = found.iter().map(|n| n.start_time).collect();
        assert_eq!(starts, vec![10.0, 60.0]);
    }

    #[test]
    fn test_merge_by_path() {
        let mut tree = sample();
        let incoming = TreeNode::leaf("nccl:all_reduce", 61.0, 69.0);
        tree.node_at_mut(&[0, 0]).unwrap().merge_from(&incoming);
        assert_eq!(tree.children[0].children[0].name, "nccl:all_reduce");
        assert!(tree.node_at_mut(&[3]).is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(TreeNode::leaf("x", 1.0, 2.0)).unwrap();
        assert_eq!(json["type"], "");
        assert!(json["external_id"].is_null());
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
