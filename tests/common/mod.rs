//! Synthetic DDP trace shared by the integration tests.
//!
//! Two profiler steps on thread 1 (forward + loss), backward and optimizer on
//! thread 2, one broadcast and one all-reduce on the communication thread 3.
//! Times are in microseconds.

#![allow(dead_code)]

use serde_json::{json, Value};

pub fn op(name: &str, tid: i64, ts: f64, dur: f64) -> Value {
    json!({"ph": "X", "cat": "cpu_op", "name": name, "pid": 0, "tid": tid, "ts": ts, "dur": dur})
}

pub fn op_ext(name: &str, tid: i64, ts: f64, dur: f64, ext: i64) -> Value {
    json!({
        "ph": "X", "cat": "cpu_op", "name": name, "pid": 0, "tid": tid, "ts": ts, "dur": dur,
        "args": {"External id": ext}
    })
}

pub fn module(name: &str, tid: i64, ts: f64, dur: f64) -> Value {
    json!({"ph": "X", "cat": "python_function", "name": name, "pid": 0, "tid": tid, "ts": ts, "dur": dur})
}

fn step_events(step: u64, offset: f64) -> Vec<Value> {
    let t = |us: f64| offset + us;
    vec![
        // main thread
        json!({"ph": "X", "cat": "user_annotation", "name": format!("ProfilerStep#{}", step),
               "pid": 0, "tid": 1, "ts": t(0.0), "dur": 1000.0}),
        module("nn.Module: DistributedDataParallel_0", 1, t(10.0), 390.0),
        op_ext("nccl:broadcast", 1, t(12.0), 2.0, 42),
        module("nn.Module: Linear_0", 1, t(20.0), 130.0),
        module("nn.Module: Linear_1", 1, t(160.0), 140.0),
        op("aten::cross_entropy_loss", 1, t(410.0), 40.0),
        op("aten::log_softmax", 1, t(412.0), 18.0),
        // backward thread
        json!({"ph": "X", "cat": "user_annotation", "name": format!("ProfilerStep#{}", step),
               "pid": 0, "tid": 2, "ts": t(5.0), "dur": 1.0}),
        op("nn.Module: DistributedDataParallel_0.backward", 2, t(460.0), 440.0),
        op("autograd::engine::evaluate_function: DDPBackward", 2, t(460.0), 440.0),
        op("nn.Module: Linear_1.backward", 2, t(470.0), 130.0),
        op_ext("nccl:all_reduce", 2, t(550.0), 10.0, 5),
        op("nn.Module: Linear_0.backward", 2, t(610.0), 240.0),
        op("aten::mm", 2, t(620.0), 80.0),
        op("Optimizer.step#SGD.step", 2, t(910.0), 80.0),
    ]
}

/// The full two-step trace as a `traceEvents` payload
pub fn ddp_trace() -> Value {
    let mut events = step_events(1, 0.0);
    events.extend(step_events(2, 1000.0));

    // communication thread
    events.push(op_ext("nccl:broadcast", 3, 20.0, 10.0, 42));
    events.push(op_ext("nccl:all_reduce", 3, 555.0, 20.0, 5));

    // noise the pipeline must ignore
    events.push(json!({"ph": "i", "cat": "cpu_instant_event", "name": "[memory]", "tid": 1, "ts": 30.0}));
    events.push(json!({"ph": "M", "name": "thread_name", "tid": 1, "args": {"name": "main"}}));

    json!({"schemaVersion": 1, "traceEvents": events})
}
