//! Callees executed inside a block.

use serde::{Deserialize, Serialize};

use crate::span::ExecutionSpan;
use crate::types::CallGraph;

pub const NO_CALLS: &str = "No calls found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub id: i64,
    pub method_name: String,
}

/// Resolved callees of `focus_call_id` whose call site falls inside `span`.
///
/// A callee body starts one record after its call site, so `start - 1` is
/// the calling line.
pub fn recorded_calls(graph: &CallGraph, focus_call_id: i64, span: ExecutionSpan) -> Vec<RecordedCall> {
    let Some(focus) = graph.get(focus_call_id) else {
        tracing::warn!(call_id = focus_call_id, "focused call missing from call graph");
        return Vec::new();
    };

    focus
        .call_list
        .iter()
        .filter_map(|callee_id| graph.get(*callee_id))
        .filter(|callee| callee.is_resolved() && span.contains(callee.start - 1))
        .map(|callee| RecordedCall {
            id: callee.call_id,
            method_name: callee.method_name.clone(),
        })
        .collect()
}

/// `id: method` per line, or [`NO_CALLS`].
pub fn render_calls(calls: &[RecordedCall]) -> String {
    if calls.is_empty() {
        return NO_CALLS.to_string();
    }
    calls
        .iter()
        .map(|c| format!("{}: {}", c.id, c.method_name))
        .collect::<Vec<_>>()
        .join("\n")
}
