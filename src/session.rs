//! The debugging session: which method and window are in focus.
//!
//! A `Session` is a plain value. Every phase receives the session it runs
//! under and returns the session the next phase should see; both are
//! persisted with the phase result so any checkpoint can be resumed.

use serde::{Deserialize, Serialize};

use crate::errors::PhaseError;
use crate::fixtures::DebugData;
use crate::reply::CodeBlock;
use pilot_trace::LineRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Call record currently being analyzed.
    pub call_id: i64,
    pub method_name: String,
    pub start_line: i64,
    pub end_line: i64,
    /// Line-numbered source of the current window.
    pub code: String,
    /// Method names from the test down to the focused method.
    pub stack: Vec<String>,
    /// Accumulated narrative handed to every request.
    pub context: String,
}

impl Session {
    /// Focus on the failing test method.
    pub fn start(data: &DebugData) -> Result<Self, PhaseError> {
        let name = &data.start.test_unit;
        let source = data.method(name).ok_or_else(|| PhaseError::UnknownMethod {
            method: name.clone(),
        })?;
        Ok(Self {
            call_id: data.start.test_trace,
            method_name: name.clone(),
            start_line: source.start_line,
            end_line: source.end_line,
            code: source.whole.clone(),
            stack: vec![name.clone()],
            context: format!(
                "test task summary (groundtruth):\n{}\nreport from test unit:\n{}",
                data.start.test_task, data.start.test_failure
            ),
        })
    }

    pub fn window(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }

    pub fn is_single_line(&self) -> bool {
        self.start_line == self.end_line
    }

    /// Narrow the window to `block`.
    pub fn narrow_to(mut self, block: &CodeBlock) -> Self {
        self.start_line = block.start_line;
        self.end_line = block.end_line;
        self.code = cut_code_snippet(&self.code, block.start_line, block.end_line);
        self
    }

    /// Focus on callee `call_id`, extending the stack.
    pub fn step_into(mut self, call_id: i64, data: &DebugData) -> Result<Self, PhaseError> {
        let call = data.calls.call(call_id)?;
        let source = data
            .method(&call.method_name)
            .ok_or_else(|| PhaseError::UnknownMethod {
                method: call.method_name.clone(),
            })?;
        self.call_id = call_id;
        self.method_name = call.method_name.clone();
        self.start_line = source.start_line;
        self.end_line = source.end_line;
        self.code = source.whole.clone();
        self.stack.push(call.method_name.clone());
        Ok(self)
    }

    /// Append a comparison summary for the current window.
    pub fn with_analysis(mut self, summary: &str) -> Self {
        self.context.push_str(&format!(
            "\n\nanalysis from {}[{}:{}]:\n{}",
            self.method_name, self.start_line, self.end_line, summary
        ));
        self
    }

    /// Append a hint supplied by the person driving the session.
    pub fn with_insight(mut self, insight: &str) -> Self {
        self.context.push_str(&format!("\n\nUser insight:\n{}", insight));
        self
    }

    pub fn stack_text(&self) -> String {
        self.stack.join("\n")
    }
}

/// Lines of line-numbered `code` whose number lies in `start..=end`.
///
/// Lines without a leading number are dropped.
pub fn cut_code_snippet(code: &str, start: i64, end: i64) -> String {
    code.lines()
        .filter(|line| {
            line.split_whitespace()
                .next()
                .and_then(|num| num.parse::<i64>().ok())
                .is_some_and(|num| start <= num && num <= end)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
