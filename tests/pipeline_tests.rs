mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use trace_dag_studio::aggregator::{
    classify_steps, extract_step_number, normalize_steps, retrim_steps, step_view, Category,
    MarkerTable, RoleNodes, StepAccumulator, StepMap, StepRecord, TrimmedNode,
};
use trace_dag_studio::aggregator::normalizer::normalize_record;
use trace_dag_studio::dag::{synthesize, synthesize_step, EdgeKind, Lane};
use trace_dag_studio::parser::{build_trees, create_nodes, to_tree_map, OperatorTreeMap, TracePayload, TreeNode};
use trace_dag_studio::utils::config::{AnalysisConfig, CALL_TREE_ROOT};

fn trees_of(trace: &serde_json::Value) -> OperatorTreeMap {
    let payload = TracePayload::from_json(trace).unwrap();
    to_tree_map(&build_trees(create_nodes(&payload)).trees)
}

fn classified() -> StepAccumulator<TreeNode> {
    classify_steps(&trees_of(&common::ddp_trace()), &MarkerTable::default())
}

fn trimmed(name: &str, start: f64, end: f64) -> TrimmedNode {
    TrimmedNode {
        name: name.to_string(),
        start_time: start,
        end_time: end,
        dur: end - start,
        category: Category::Computation,
        children: None,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_tree_round_trip() {
    let trees = trees_of(&common::ddp_trace());
    assert_eq!(trees.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);

    let json = serde_json::to_string(&trees).unwrap();
    let parsed: OperatorTreeMap = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, trees);

    let main = &parsed[&1];
    assert_eq!(main.name, CALL_TREE_ROOT);
    assert_eq!(main.children.len(), 2);

    let step = &main.children[0];
    assert_eq!(step.name, "ProfilerStep#1");
    assert_eq!(step.node_type, "ProfilerStep");
    let names: Vec<&str> = step.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["nn.Module: DistributedDataParallel_0", "aten::cross_entropy_loss"]);
    assert_eq!(step.children[0].node_type, "Module");
    assert_eq!(step.children[0].children.len(), 3);
    assert_eq!(step.children[1].children[0].name, "aten::log_softmax");
}

#[test]
fn test_thread_ids_serialize_as_strings() {
    let trees = trees_of(&json!([{"ph": "X", "cat": "cpu_op", "name": "a", "tid": 12, "ts": 0, "dur": 1}]));
    let value = serde_json::to_value(&trees).unwrap();
    assert_eq!(value["12"]["children"][0]["name"], "a");
    assert_eq!(value["12"]["children"][0]["type"], "Operator");
}

#[test]
fn test_step_extraction() {
    assert_eq!(extract_step_number("ProfilerStep#7"), Some(7));
    assert_eq!(extract_step_number("nn.Module: Linear_0"), None);

    let steps = classified();
    assert_eq!(steps.step_numbers(), vec![1, 2]);

    let step1 = steps.get(1).unwrap();
    assert_eq!(step1.forward_nodes()[0].name, "nn.Module: DistributedDataParallel_0");
    assert_eq!(step1.loss.as_ref().unwrap().name, "aten::cross_entropy_loss");
    assert_eq!(step1.backward_nodes().len(), 1);
    assert_eq!(step1.optimizer.as_ref().unwrap().start_time, 910.0);
}

#[test]
fn test_cross_step_broadcast() {
    let steps = classified();
    for step in [1, 2] {
        let broadcasts = &steps.get(step).unwrap().broadcasts;
        assert_eq!(broadcasts.len(), 1, "step {}", step);
        assert_eq!(broadcasts[0].external_id, Some(42));
        assert_eq!(broadcasts[0].start_time, 20.0);
    }
}

#[test]
fn test_all_reduce_single_claim() {
    let steps = classified();
    let placeholder = |step: u64| {
        steps.get(step).unwrap().backward_nodes()[0]
            .find_depth_first(|n| n.name == "nccl:all_reduce")
            .cloned()
            .unwrap()
    };

    let claimed = placeholder(1);
    assert_eq!((claimed.start_time, claimed.end_time), (555.0, 575.0));

    let untouched = placeholder(2);
    assert_eq!((untouched.start_time, untouched.end_time), (1550.0, 1560.0));
}

#[test]
fn test_normalized_step() {
    let config = AnalysisConfig::default();
    let steps = normalize_steps(&classified(), &config);
    let step1 = &steps[&1];

    let forward: Vec<&str> = step1.forward_nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(forward, vec!["nn.Module: Linear_0", "nn.Module: Linear_1"]);
    assert!(close(step1.forward_nodes()[0].start_time, 0.02));

    let backward = step1.backward_nodes();
    assert_eq!(backward[0].name, "nn.Module: Linear_1.backward");
    let all_reduces = backward[0].children.as_ref().unwrap();
    assert_eq!(all_reduces.len(), 1);
    assert_eq!(all_reduces[0].category, Category::Communication);
    assert!(close(all_reduces[0].dur, 0.02));
    assert_eq!(backward[1].children.as_ref().unwrap().len(), 0);

    let loss = step1.loss.as_ref().unwrap();
    assert!(loss.children.is_none());
    assert_eq!(step1.broadcasts[0].category, Category::Communication);
}

#[test]
fn test_normalizer_idempotent() {
    let config = AnalysisConfig::default();
    let steps = normalize_steps(&classified(), &config);
    assert_eq!(retrim_steps(&steps, &config), steps);
    assert_eq!(retrim_steps(&retrim_steps(&steps, &config), &config), steps);
}

#[test]
fn test_negative_duration_clamped() {
    let record = StepRecord {
        loss: Some(TreeNode::leaf("aten::cross_entropy_loss", 5000.0, 4000.0)),
        ..Default::default()
    };

    let clamped = normalize_record(&record, &AnalysisConfig::default());
    let loss = clamped.loss.unwrap();
    assert_eq!(loss.end_time, loss.start_time);
    assert_eq!(loss.dur, 0.0);

    let config = AnalysisConfig {
        clamp_negative_durations: false,
        ..Default::default()
    };
    let kept = normalize_record(&record, &config).loss.unwrap();
    assert!(kept.dur < 0.0);
}

#[test]
fn test_rescale_to_span() {
    let config = AnalysisConfig {
        time_divisor: 1.0,
        ..Default::default()
    };
    let mut steps = StepMap::new();
    steps.insert(
        3,
        StepRecord {
            forward: Some(RoleNodes::Single(trimmed("nn.Module: Sequential_0", 100.0, 140.0))),
            loss: Some(trimmed("aten::cross_entropy_loss", 140.0, 150.0)),
            backward: Some(RoleNodes::Many(vec![TrimmedNode {
                children: Some(vec![trimmed("nccl:all_reduce", 170.0, 190.0)]),
                ..trimmed("nn.Module: Linear_0.backward", 150.0, 180.0)
            }])),
            optimizer: Some(trimmed("Optimizer.step#SGD.step", 190.0, 200.0)),
            ..Default::default()
        },
    );

    let view = step_view(&steps, &config);
    let record = &view[&3];

    assert_eq!(record.forward_nodes()[0].name, "Seq0");
    assert_eq!(record.optimizer.as_ref().unwrap().name, "Optimizer");
    assert!(close(record.forward_nodes()[0].start_time, 0.0));
    assert!(close(record.optimizer.as_ref().unwrap().end_time, 10.0));

    let child = &record.backward_nodes()[0].children.as_ref().unwrap()[0];
    assert!(close(child.start_time, 7.0));
    assert!(close(child.dur, 2.0));

    // The source map is untouched
    assert_eq!(steps[&3].forward_nodes()[0].start_time, 100.0);
}

#[test]
fn test_dag_edge_scenario() {
    let record = StepRecord {
        forward: Some(RoleNodes::Single(trimmed("F", 0.0, 1.0))),
        loss: Some(trimmed("L", 1.0, 2.0)),
        backward: Some(RoleNodes::Many(vec![
            TrimmedNode {
                children: Some(vec![trimmed("nccl:all_reduce", 2.5, 3.5)]),
                ..trimmed("B1", 2.0, 3.0)
            },
            TrimmedNode {
                children: Some(vec![]),
                ..trimmed("B2", 3.0, 4.0)
            },
        ])),
        optimizer: Some(trimmed("O", 4.0, 5.0)),
        ..Default::default()
    };

    let dag = synthesize_step(&record, &AnalysisConfig::default());

    let pairs: Vec<(String, String)> = dag.labelled_edges();
    let expected: Vec<(String, String)> = [
        ("F", "L"),
        ("L", "B1"),
        ("B1", "nccl:all_reduce"),
        ("nccl:all_reduce", "B2"),
        ("B2", "O"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    assert_eq!(pairs, expected);

    let kinds: Vec<EdgeKind> = dag.edges.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EdgeKind::Seq,
            EdgeKind::Seq,
            EdgeKind::BackwardToAllreduce,
            EdgeKind::AllreduceToNextBackward,
            EdgeKind::ToOptimizer,
        ]
    );

    let all_reduce = dag.nodes.iter().find(|n| n.label == "nccl:all_reduce").unwrap();
    assert_eq!(all_reduce.lane, Lane::Bottom);
    assert_eq!(all_reduce.category, Category::Communication);
    assert_eq!(dag.nodes.len(), 6);
}

#[test]
fn test_dag_from_trace() {
    let config = AnalysisConfig::default();
    let steps = normalize_steps(&classified(), &config);
    let dags = synthesize(&steps, &config);

    assert_eq!(dags.len(), 2);
    let kinds: Vec<EdgeKind> = dags[&1].edges.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EdgeKind::BcastToFirstForward,
            EdgeKind::Seq,
            EdgeKind::Seq,
            EdgeKind::Seq,
            EdgeKind::BackwardToAllreduce,
            EdgeKind::AllreduceToNextBackward,
            EdgeKind::ToOptimizer,
        ]
    );

    // Ids restart for every step
    assert_eq!(dags[&1].nodes[0].id, "comp_0");
    assert_eq!(dags[&2].nodes[0].id, "comp_0");
}

#[test]
fn test_empty_input() {
    let config = AnalysisConfig::default();
    let trees = trees_of(&json!({"traceEvents": []}));
    assert!(trees.is_empty());

    let steps = normalize_steps(&classify_steps(&trees, &config.markers), &config);
    assert!(steps.is_empty());
    assert!(synthesize(&steps, &config).is_empty());
}
