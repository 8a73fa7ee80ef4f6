//! Typed nodes built from raw trace records.
//!
//! Every kept record becomes exactly one `OperatorNode`. The `kind` tag
//! says which role the node plays when the tree is assembled; runtime
//! nodes carry the device nodes they launched inside their kind.

use super::trace::{EventType, RawEvent, TracePayload};
use crate::utils::config::{CALL_TREE_ROOT, COLLECTIVE_OP_NAMES};
use log::debug;

/// Variant tag of an operator node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Synthetic per-thread root
    Root,
    Operator,
    Module,
    ProfilerStep,
    /// Host-side launch; owns the device work correlated to it
    Runtime { devices: Vec<OperatorNode> },
    Device,
    /// Collective operator (NCCL / Gloo)
    Communication,
    /// Framework-profile span (lightning `[pl][profile]`)
    FrameworkProfile,
    /// Framework module span (lightning `[pl][module]`)
    FrameworkModule,
}

/// A node of a per-thread call tree
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    pub name: String,
    pub event_type: EventType,
    pub kind: NodeKind,
    pub tid: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub external_id: Option<i64>,
    pub correlation_id: Option<i64>,
    pub children: Vec<OperatorNode>,
    /// Runtime launches attributed to this operator through its external id
    pub runtimes: Vec<OperatorNode>,
}

impl OperatorNode {
    /// Build a node from a classified record
    pub fn from_event(event: &RawEvent, event_type: EventType, kind: NodeKind) -> Self {
        Self {
            name: event.name.clone(),
            event_type,
            kind,
            tid: event.tid,
            start_time: event.ts,
            end_time: event.end_time(),
            external_id: event.external_id,
            correlation_id: event.correlation_id,
            children: Vec::new(),
            runtimes: Vec::new(),
        }
    }

    /// Empty synthetic root for one thread
    pub fn root(tid: i64) -> Self {
        Self {
            name: CALL_TREE_ROOT.to_string(),
            event_type: EventType::Python,
            kind: NodeKind::Root,
            tid,
            start_time: 0.0,
            end_time: 0.0,
            external_id: None,
            correlation_id: None,
            children: Vec::new(),
            runtimes: Vec::new(),
        }
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self.kind, NodeKind::Runtime { .. })
    }

    pub fn is_device(&self) -> bool {
        self.kind == NodeKind::Device
    }

    pub fn is_framework_profile(&self) -> bool {
        self.kind == NodeKind::FrameworkProfile
    }

    /// Device nodes of a runtime node (empty for every other kind)
    pub fn devices(&self) -> &[OperatorNode] {
        match &self.kind {
            NodeKind::Runtime { devices } => devices,
            _ => &[],
        }
    }

    /// Attach a device node; ignored for anything but runtime nodes
    pub fn push_device(&mut self, device: OperatorNode) {
        if let NodeKind::Runtime { devices } = &mut self.kind {
            devices.push(device);
        }
    }

    /// Duration in raw trace units
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Create the typed node for one record, or `None` when it is discarded
///
/// **Public** - the Event Model entry point
///
/// Memory records and unknown categories are always discarded.
pub fn create_node(event: &RawEvent, framework_lightning: bool) -> Option<OperatorNode> {
    let event_type = event.classify(framework_lightning)?;

    let kind = match event_type {
        EventType::Memory => return None,
        EventType::Kernel | EventType::Memcpy | EventType::Memset => NodeKind::Device,
        EventType::Runtime => NodeKind::Runtime {
            devices: Vec::new(),
        },
        EventType::ProfilerStep => NodeKind::ProfilerStep,
        EventType::Module => NodeKind::Module,
        EventType::PlProfile => NodeKind::FrameworkProfile,
        EventType::PlModule => NodeKind::FrameworkModule,
        EventType::Operator | EventType::Python | EventType::UserAnnotation => {
            if COLLECTIVE_OP_NAMES.contains(&event.name.as_str()) {
                NodeKind::Communication
            } else {
                NodeKind::Operator
            }
        }
    };

    Some(OperatorNode::from_event(event, event_type, kind))
}

/// Map every record of a payload to its typed node, preserving order
pub fn create_nodes(payload: &TracePayload) -> Vec<OperatorNode> {
    let lightning = payload.is_lightning();
    let nodes: Vec<OperatorNode> = payload
        .events
        .iter()
        .filter_map(|event| create_node(event, lightning))
        .collect();

    debug!(
        "Event model kept {} of {} records",
        nodes.len(),
        payload.events.len()
    );

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> RawEvent {
        RawEvent::from_value(&value)
    }

    #[test]
    fn test_memory_discarded() {
        let e = event(json!({"ph": "i", "cat": "cpu_instant_event", "name": "[memory]"}));
        assert!(create_node(&e, false).is_none());
    }

    #[test]
    fn test_device_and_runtime_kinds() {
        let kernel = create_node(&event(json!({"ph": "X", "cat": "kernel", "name": "k"})), false).unwrap();
        assert!(kernel.is_device());

        let mut runtime = create_node(
            &event(json!({"ph": "X", "cat": "cuda_runtime", "name": "cudaLaunchKernel"})),
            false,
        )
        .unwrap();
        assert!(runtime.is_runtime());

        runtime.push_device(kernel.clone());
        assert_eq!(runtime.devices().len(), 1);

        let mut op = kernel;
        op.push_device(runtime.clone());
        assert!(op.devices().is_empty());
    }

    #[test]
    fn test_collective_becomes_communication() {
        let node = create_node(
            &event(json!({"ph": "X", "cat": "cpu_op", "name": "nccl:all_reduce", "args": {"External id": 5}})),
            false,
        )
        .unwrap();
        assert_eq!(node.kind, NodeKind::Communication);
        assert_eq!(node.event_type, EventType::Operator);
        assert_eq!(node.external_id, Some(5));
    }

    #[test]
    fn test_create_nodes_keeps_order() {
        let payload = TracePayload::from_json(&json!([
            {"ph": "X", "cat": "cpu_op", "name": "b", "ts": 10},
            {"ph": "i", "cat": "cpu_instant_event", "name": "[memory]", "ts": 11},
            {"ph": "X", "cat": "cpu_op", "name": "a", "ts": 1}
        ]))
        .unwrap();

        let nodes = create_nodes(&payload);
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
