//! Trace and call-graph records as they come from the tracing backend.
//!
//! These are immutable inputs: the extractor never mutates them. Identifiers
//! and values arrive as either JSON strings or numbers depending on the
//! tracer, so both are normalized to `String`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::error::TraceError;

/// Alias key meaning "this variable is not aliased".
pub const NO_ALIAS: &str = "-1";

/// Pointer/index sentinel: no record, never consumed, or defined before the trace.
pub const NO_LINK: i64 = -1;

fn default_alias() -> String {
    NO_ALIAS.to_string()
}

fn no_link() -> i64 {
    NO_LINK
}

/// Accept a string, number, bool or null and keep its textual form.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// One traced value read or written by a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default, deserialize_with = "scalar_string")]
    pub id: String,
    /// Aliasing key; two variables sharing a non-sentinel alias are the same object.
    #[serde(default = "default_alias", deserialize_with = "scalar_string")]
    pub alias_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub value: String,
    /// 0 for a top-level entry of its list, >0 for nested members.
    #[serde(default)]
    pub depth: u32,
    /// For reads: trace id of the record that produced the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depend: Option<i64>,
    /// For writes: trace id of the next record consuming the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<i64>,
}

impl Variable {
    pub fn has_alias(&self) -> bool {
        !self.alias_id.is_empty() && self.alias_id != NO_ALIAS
    }

    pub fn depend_or_sentinel(&self) -> i64 {
        self.depend.unwrap_or(NO_LINK)
    }

    pub fn reverse_or_sentinel(&self) -> i64 {
        self.reverse.unwrap_or(NO_LINK)
    }
}

/// One executed source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: i64,
    pub line: i64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub input: Vec<Variable>,
    #[serde(default)]
    pub output: Vec<Variable>,
    /// Next record of the same frame, skipping anything nested under this line.
    #[serde(default = "no_link")]
    pub son: i64,
    /// Last trace id belonging to this line's dynamic extent.
    #[serde(default = "no_link")]
    pub sip: i64,
}

/// The full execution trace, addressed by 1-based `trace_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    pub fn new(records: Vec<TraceRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, trace_id: i64) -> Option<&TraceRecord> {
        if trace_id < 1 {
            return None;
        }
        self.records.get((trace_id - 1) as usize)
    }

    /// Like [`Trace::get`] but reports a dangling pointer as an error.
    pub fn record(&self, trace_id: i64) -> Result<&TraceRecord, TraceError> {
        self.get(trace_id)
            .ok_or(TraceError::MissingRecord { trace_id })
    }
}

/// One method invocation in the call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: i64,
    pub method_name: String,
    /// Trace id of the line that performed the call.
    #[serde(default = "no_link")]
    pub call_trace: i64,
    #[serde(default = "no_link")]
    pub start: i64,
    #[serde(default = "no_link")]
    pub end: i64,
    #[serde(default)]
    pub call_list: Vec<i64>,
}

impl CallRecord {
    /// Whether the tracer captured both the call site and the callee body.
    pub fn is_resolved(&self) -> bool {
        self.call_trace != NO_LINK && self.start != NO_LINK && self.end != NO_LINK
    }
}

/// Call records indexed by `call_id`. Serialized as a plain list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CallRecord>", into = "Vec<CallRecord>")]
pub struct CallGraph {
    records: Vec<CallRecord>,
    index: HashMap<i64, usize>,
}

impl From<Vec<CallRecord>> for CallGraph {
    fn from(records: Vec<CallRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.call_id, pos))
            .collect();
        Self { records, index }
    }
}

impl From<CallGraph> for Vec<CallRecord> {
    fn from(graph: CallGraph) -> Self {
        graph.records
    }
}

impl CallGraph {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, call_id: i64) -> Option<&CallRecord> {
        self.index.get(&call_id).map(|&pos| &self.records[pos])
    }

    pub fn call(&self, call_id: i64) -> Result<&CallRecord, TraceError> {
        self.get(call_id).ok_or(TraceError::UnknownCall { call_id })
    }
}

/// Direction of a manually declared trace fix-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixDirection {
    Input,
    Output,
}

/// A read or write the tracer missed, declared by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFix {
    pub trace_id: i64,
    pub io: FixDirection,
    pub var: Variable,
}
