//! Raw trace payload decoding.
//!
//! Turns the JSON emitted by the training profiler into `RawEvent` records
//! and classifies each record into an `EventType`. Decoding is lenient:
//! a record with missing or garbled fields gets defaults (empty name,
//! empty category, zero timestamp) instead of failing the whole trace.

use crate::utils::config::{
    CORRELATION_ID_KEYS, EXTERNAL_ID_KEYS, ITERATION_START_PREFIX, MAX_RECORD_WINDOW_US,
    RECORD_WINDOW_END,
};
use crate::utils::error::ParseError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category a record falls into after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Operator,
    ProfilerStep,
    Module,
    Python,
    UserAnnotation,
    Runtime,
    Kernel,
    Memcpy,
    Memset,
    Memory,
    #[serde(rename = "PLModule")]
    PlModule,
    #[serde(rename = "PLProfile")]
    PlProfile,
}

impl EventType {
    /// Tag written as the `type` field of tree nodes
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Operator => "Operator",
            EventType::ProfilerStep => "ProfilerStep",
            EventType::Module => "Module",
            EventType::Python => "Python",
            EventType::UserAnnotation => "UserAnnotation",
            EventType::Runtime => "Runtime",
            EventType::Kernel => "Kernel",
            EventType::Memcpy => "Memcpy",
            EventType::Memset => "Memset",
            EventType::Memory => "Memory",
            EventType::PlModule => "PLModule",
            EventType::PlProfile => "PLProfile",
        }
    }

    /// Map a raw category tag (case-insensitive) to its base event type
    pub fn from_category(category: &str) -> Option<Self> {
        match category.to_ascii_lowercase().as_str() {
            "cpu_op" | "operator" => Some(EventType::Operator),
            "python_function" | "python" => Some(EventType::Python),
            "user_annotation" | "gpu_user_annotation" => Some(EventType::UserAnnotation),
            "cuda_runtime" | "cuda_driver" | "runtime" => Some(EventType::Runtime),
            "kernel" => Some(EventType::Kernel),
            "gpu_memcpy" | "memcpy" => Some(EventType::Memcpy),
            "gpu_memset" | "memset" => Some(EventType::Memset),
            "memory" => Some(EventType::Memory),
            _ => None,
        }
    }

    /// Device-side execution (kernel, memory copy, memory set)
    pub fn is_device(&self) -> bool {
        matches!(self, EventType::Kernel | EventType::Memcpy | EventType::Memset)
    }

    /// Host-side work that nests into per-thread operator trees
    pub fn is_operator_class(&self) -> bool {
        matches!(
            self,
            EventType::Operator
                | EventType::ProfilerStep
                | EventType::Module
                | EventType::Python
                | EventType::UserAnnotation
                | EventType::PlModule
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw record from the trace. Never mutated after decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub category: String,
    /// Chrome-trace phase (`X`, `i`, `M`, `s`, `f`, ...)
    pub phase: String,
    pub pid: i64,
    pub tid: i64,
    pub ts: f64,
    pub dur: Option<f64>,
    /// Explicit end timestamp, for exporters that write one instead of `dur`
    pub end_ts: Option<f64>,
    pub external_id: Option<i64>,
    pub correlation_id: Option<i64>,
}

impl RawEvent {
    /// Decode one record, defaulting whatever is missing
    pub fn from_value(value: &Value) -> Self {
        let args = value.get("args");

        Self {
            name: string_field(value, "name"),
            category: string_field(value, "cat"),
            phase: string_field(value, "ph"),
            pid: value.get("pid").map(lenient_id).unwrap_or(0),
            tid: value.get("tid").map(lenient_id).unwrap_or(0),
            ts: value.get("ts").and_then(lenient_f64).unwrap_or(0.0),
            dur: value.get("dur").and_then(lenient_f64),
            end_ts: value
                .get("end_ts")
                .or_else(|| value.get("te"))
                .and_then(lenient_f64),
            external_id: args.and_then(|a| first_id(a, EXTERNAL_ID_KEYS)),
            correlation_id: args.and_then(|a| first_id(a, CORRELATION_ID_KEYS)),
        }
    }

    /// End timestamp: explicit end, else `ts + dur`, else `ts`
    pub fn end_time(&self) -> f64 {
        match (self.end_ts, self.dur) {
            (Some(end), _) => end,
            (None, Some(dur)) => self.ts + dur,
            (None, None) => self.ts,
        }
    }

    /// Classify this record, or `None` when it is not a duration event we model
    ///
    /// Memory records are still classified (as `Memory`) so callers can count
    /// and drop them explicitly.
    pub fn classify(&self, framework_lightning: bool) -> Option<EventType> {
        if self.phase == "M" || self.category.eq_ignore_ascii_case("fwdbwd") {
            return None;
        }

        let is_instant = matches!(self.phase.as_str(), "i" | "I");
        if self.category.eq_ignore_ascii_case("memory") || (is_instant && self.name == "[memory]") {
            return Some(EventType::Memory);
        }

        // Only complete events carry an interval; a missing phase is treated as complete
        if !(self.phase.is_empty() || self.phase == "X") {
            return None;
        }

        let base = EventType::from_category(&self.category)?;

        if framework_lightning {
            if self.name.starts_with("[pl][profile]") {
                return Some(EventType::PlProfile);
            }
            if self.name.starts_with("[pl][module]") {
                return Some(EventType::PlModule);
            }
        }

        let event_type = match base {
            EventType::Operator | EventType::UserAnnotation
                if self.name.starts_with("ProfilerStep#") =>
            {
                EventType::ProfilerStep
            }
            EventType::Python if self.name.starts_with("nn.Module:") => EventType::Module,
            other => other,
        };

        Some(event_type)
    }
}

/// A decoded trace: metadata plus its ordered list of records
#[derive(Debug, Clone, Default)]
pub struct TracePayload {
    /// `Framework` metadata (e.g. "pytorch-lightning")
    pub framework: Option<String>,
    pub schema_version: Option<Value>,
    pub device_properties: Option<Value>,
    pub events: Vec<RawEvent>,
}

impl TracePayload {
    /// Decode a payload from either `{"traceEvents": [...]}` or a bare array
    ///
    /// # Errors
    /// * `ParseError::InvalidFormat` - neither an object with `traceEvents` nor an array
    pub fn from_json(raw: &Value) -> Result<Self, ParseError> {
        let (events, framework, schema_version, device_properties) = match raw {
            Value::Object(obj) => {
                let events = obj
                    .get("traceEvents")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ParseError::InvalidFormat("Missing traceEvents array".to_string())
                    })?;
                (
                    events,
                    obj.get("Framework").and_then(Value::as_str).map(str::to_string),
                    obj.get("schemaVersion").cloned(),
                    obj.get("deviceProperties").cloned(),
                )
            }
            Value::Array(events) => (events, None, None, None),
            _ => {
                return Err(ParseError::InvalidFormat(
                    "Trace must be a JSON object or array".to_string(),
                ))
            }
        };

        let mut events: Vec<RawEvent> = events.iter().map(RawEvent::from_value).collect();
        drop_stale_window_end(&mut events);

        debug!("Decoded {} raw events", events.len());

        Ok(Self {
            framework,
            schema_version,
            device_properties,
            events,
        })
    }

    /// Decode a payload from a JSON string
    pub fn parse_str(raw: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json(&value)
    }

    pub fn is_lightning(&self) -> bool {
        self.framework.as_deref() == Some("pytorch-lightning")
    }
}

/// Remove a window-end marker that lies absurdly far past the last iteration
///
/// **Private** - internal helper for from_json
fn drop_stale_window_end(events: &mut Vec<RawEvent>) {
    let end_index = events.iter().rposition(|e| e.name == RECORD_WINDOW_END);
    let start_index = events
        .iter()
        .rposition(|e| e.name.starts_with(ITERATION_START_PREFIX));

    if let (Some(end), Some(start)) = (end_index, start_index) {
        let span = events[end].ts - events[start].ts;
        if span > MAX_RECORD_WINDOW_US {
            warn!(
                "Dropping '{}' record {:.0}us past the last iteration start",
                RECORD_WINDOW_END, span
            );
            events.remove(end);
        }
    }
}

/// **Private** - string field or empty
fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Numbers, or strings holding numbers
///
/// **Private** - internal utility
fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Thread/process ids: integers, or strings like "stream 7" (trailing digits)
///
/// **Private** - internal utility
fn lenient_id(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            digits.parse::<i64>().unwrap_or(0)
        }
        _ => 0,
    }
}

/// **Private** - first id present under any of the accepted keys
fn first_id(args: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        args.get(*key).and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_complete_event() {
        let event = RawEvent::from_value(&json!({
            "ph": "X", "cat": "cpu_op", "name": "aten::linear",
            "pid": 1, "tid": 7, "ts": 100.0, "dur": 20.0,
            "args": {"External id": 42}
        }));

        assert_eq!(event.name, "aten::linear");
        assert_eq!(event.tid, 7);
        assert_eq!(event.end_time(), 120.0);
        assert_eq!(event.external_id, Some(42));
        assert_eq!(event.correlation_id, None);
        assert_eq!(event.classify(false), Some(EventType::Operator));
    }

    #[test]
    fn test_malformed_record_defaults() {
        let event = RawEvent::from_value(&json!({"name": null, "ts": "garbage"}));
        assert_eq!(event.name, "");
        assert_eq!(event.category, "");
        assert_eq!(event.ts, 0.0);
        assert_eq!(event.end_time(), 0.0);
    }

    #[test]
    fn test_string_thread_id() {
        let event = RawEvent::from_value(&json!({"tid": "stream 7"}));
        assert_eq!(event.tid, 7);
        let event = RawEvent::from_value(&json!({"tid": "main"}));
        assert_eq!(event.tid, 0);
    }

    #[test]
    fn test_classify_variants() {
        let step = RawEvent::from_value(&json!({"ph": "X", "cat": "cpu_op", "name": "ProfilerStep#3"}));
        assert_eq!(step.classify(false), Some(EventType::ProfilerStep));
        let step = RawEvent::from_value(
            &json!({"ph": "X", "cat": "user_annotation", "name": "ProfilerStep#4"}),
        );
        assert_eq!(step.classify(false), Some(EventType::ProfilerStep));

        let module = RawEvent::from_value(
            &json!({"ph": "X", "cat": "python_function", "name": "nn.Module: Linear_0"}),
        );
        assert_eq!(module.classify(false), Some(EventType::Module));

        let kernel = RawEvent::from_value(&json!({"ph": "X", "cat": "Kernel", "name": "gemm"}));
        assert_eq!(kernel.classify(false), Some(EventType::Kernel));
        assert!(EventType::Kernel.is_device());

        let memory = RawEvent::from_value(&json!({"ph": "i", "cat": "cpu_instant_event", "name": "[memory]"}));
        assert_eq!(memory.classify(false), Some(EventType::Memory));

        let unknown = RawEvent::from_value(&json!({"ph": "X", "cat": "ac2g", "name": "x"}));
        assert_eq!(unknown.classify(false), None);

        let flow = RawEvent::from_value(&json!({"ph": "s", "cat": "fwdbwd", "name": "fwdbwd"}));
        assert_eq!(flow.classify(false), None);
    }

    #[test]
    fn test_classify_lightning() {
        let event = RawEvent::from_value(
            &json!({"ph": "X", "cat": "user_annotation", "name": "[pl][profile]run_training_epoch"}),
        );
        assert_eq!(event.classify(true), Some(EventType::PlProfile));
        assert_eq!(event.classify(false), Some(EventType::UserAnnotation));
    }

    #[test]
    fn test_payload_from_object_and_array() {
        let payload = TracePayload::from_json(&json!({
            "Framework": "pytorch-lightning",
            "traceEvents": [{"ph": "X", "cat": "cpu_op", "name": "a", "ts": 5}]
        }))
        .unwrap();
        assert!(payload.is_lightning());
        assert_eq!(payload.events.len(), 1);

        let payload = TracePayload::from_json(&json!([{"name": "a"}, {"name": "b"}])).unwrap();
        assert_eq!(payload.events.len(), 2);

        assert!(TracePayload::from_json(&json!("nope")).is_err());
        assert!(TracePayload::from_json(&json!({"other": []})).is_err());
    }

    #[test]
    fn test_stale_window_end_dropped() {
        let payload = TracePayload::from_json(&json!([
            {"name": "Iteration Start: PyTorch Profiler", "ts": 0},
            {"name": "Record Window End", "ts": 1.0e12}
        ]))
        .unwrap();
        assert_eq!(payload.events.len(), 1);

        let payload = TracePayload::from_json(&json!([
            {"name": "Iteration Start: PyTorch Profiler", "ts": 0},
            {"name": "Record Window End", "ts": 1000}
        ]))
        .unwrap();
        assert_eq!(payload.events.len(), 2);
    }
}
