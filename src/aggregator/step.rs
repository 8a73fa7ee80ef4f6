//! Per-step role records and their accumulator.

use serde::{Deserialize, Serialize};

/// Either one node or an ordered list of nodes
///
/// Serialized untagged: a single node is written as an object, a list as an
/// array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleNodes<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> RoleNodes<T> {
    /// `None` for an empty list, `Single` for exactly one node
    pub fn from_vec(mut nodes: Vec<T>) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop().map(RoleNodes::Single),
            _ => Some(RoleNodes::Many(nodes)),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            RoleNodes::Single(node) => std::slice::from_ref(node),
            RoleNodes::Many(nodes) => nodes,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            RoleNodes::Single(node) => std::slice::from_mut(node),
            RoleNodes::Many(nodes) => nodes,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            RoleNodes::Single(node) => vec![node],
            RoleNodes::Many(nodes) => nodes,
        }
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Append to an optional role slot, promoting a single node to a list
pub fn push_role_node<T>(slot: &mut Option<RoleNodes<T>>, node: T) {
    *slot = match slot.take() {
        None => Some(RoleNodes::Single(node)),
        Some(existing) => {
            let mut nodes = existing.into_vec();
            nodes.push(node);
            Some(RoleNodes::Many(nodes))
        }
    };
}

/// Role nodes of one training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord<T> {
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub broadcasts: Vec<T>,

    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub forward: Option<RoleNodes<T>>,

    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub loss: Option<T>,

    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub backward: Option<RoleNodes<T>>,

    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<T>,
}

fn none<V>() -> Option<V> {
    None
}

impl<T> Default for StepRecord<T> {
    fn default() -> Self {
        Self {
            broadcasts: Vec::new(),
            forward: None,
            loss: None,
            backward: None,
            optimizer: None,
        }
    }
}

impl<T> StepRecord<T> {
    pub fn forward_nodes(&self) -> &[T] {
        self.forward.as_ref().map(RoleNodes::as_slice).unwrap_or(&[])
    }

    pub fn backward_nodes(&self) -> &[T] {
        self.backward.as_ref().map(RoleNodes::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
            && self.forward.is_none()
            && self.loss.is_none()
            && self.backward.is_none()
            && self.optimizer.is_none()
    }
}

/// Step records keyed by step number, in the order steps were first seen
///
/// Unlike a map with implicit insert-on-access, a record only exists once
/// `ensure` has been called for its step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepAccumulator<T> {
    steps: Vec<(u64, StepRecord<T>)>,
}

impl<T> Default for StepAccumulator<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T> StepAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `step`, created empty on first use
    pub fn ensure(&mut self, step: u64) -> &mut StepRecord<T> {
        let index = match self.steps.iter().position(|(number, _)| *number == step) {
            Some(index) => index,
            None => {
                self.steps.push((step, StepRecord::default()));
                self.steps.len() - 1
            }
        };
        &mut self.steps[index].1
    }

    pub fn get(&self, step: u64) -> Option<&StepRecord<T>> {
        self.steps
            .iter()
            .find(|(number, _)| *number == step)
            .map(|(_, record)| record)
    }

    pub fn get_mut(&mut self, step: u64) -> Option<&mut StepRecord<T>> {
        self.steps
            .iter_mut()
            .find(|(number, _)| *number == step)
            .map(|(_, record)| record)
    }

    pub fn contains(&self, step: u64) -> bool {
        self.get(step).is_some()
    }

    /// Records in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &StepRecord<T>)> {
        self.steps.iter().map(|(number, record)| (*number, record))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u64, &mut StepRecord<T>)> {
        self.steps.iter_mut().map(|(number, record)| (*number, record))
    }

    pub fn step_numbers(&self) -> Vec<u64> {
        self.steps.iter().map(|(number, _)| *number).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Whether a node's time is spent computing or communicating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Computation,
    Communication,
}
