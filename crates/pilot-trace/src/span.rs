//! Mapping a source line range onto the trace ids that executed it.

use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::types::{CallRecord, NO_LINK, Trace};

/// Inclusive source line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: i64,
    pub end: i64,
}

impl LineRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: i64) -> bool {
        self.start <= line && line <= self.end
    }
}

/// Inclusive range of trace ids executed for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpan {
    pub first: i64,
    pub last: i64,
}

impl ExecutionSpan {
    pub fn contains(&self, trace_id: i64) -> bool {
        self.first <= trace_id && trace_id <= self.last
    }
}

/// Find the span of `call`'s execution that belongs to `range`.
///
/// Only records of the call's own frame are compared against the range; the
/// walk follows `son` pointers, so nested callee lines never end it early.
/// `Ok(None)` means the block never executed inside this call.
pub fn locate_span(
    trace: &Trace,
    call: &CallRecord,
    range: LineRange,
) -> Result<Option<ExecutionSpan>, TraceError> {
    // a well-formed frame visits each record at most once
    let budget = trace.len();

    let mut cursor = call.start;
    let mut record = trace.record(cursor)?;
    let mut steps = 0;
    while cursor != call.end && record.line < range.start {
        steps += 1;
        if steps > budget {
            return Err(TraceError::CyclicLinks { trace_id: call.start });
        }
        cursor = record.son;
        record = trace.record(cursor)?;
    }
    if !range.contains(record.line) {
        return Ok(None);
    }

    let first = cursor;
    let mut last_in_range = record;
    let mut probe = record;
    while probe.son != NO_LINK && probe.line <= range.end {
        steps += 1;
        if steps > budget {
            return Err(TraceError::CyclicLinks { trace_id: call.start });
        }
        last_in_range = probe;
        probe = trace.record(probe.son)?;
    }

    let last = if probe.line <= range.end {
        call.end
    } else if last_in_range.sip >= first {
        last_in_range.sip
    } else {
        // tracer left no extent for the line; stop right before the first out-of-range record
        probe.trace_id - 1
    };

    Ok(Some(ExecutionSpan { first, last }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraceRecord;

    fn rec(trace_id: i64, line: i64, depth: i64, son: i64, sip: i64) -> TraceRecord {
        TraceRecord {
            trace_id,
            line,
            depth,
            input: Vec::new(),
            output: Vec::new(),
            son,
            sip,
        }
    }

    /// Lines 10..=15 of one frame, with a two-record callee nested under line 11.
    fn frame() -> (Trace, CallRecord) {
        let trace = Trace::new(vec![
            rec(1, 10, 1, 2, 1),
            rec(2, 11, 1, 5, 4),
            rec(3, 40, 2, 4, 3),
            rec(4, 41, 2, NO_LINK, 4),
            rec(5, 12, 1, 6, 5),
            rec(6, 13, 1, 7, 6),
            rec(7, 14, 1, 8, 7),
            rec(8, 15, 1, NO_LINK, 8),
        ]);
        let call = CallRecord {
            call_id: 0,
            method_name: "Test#run".into(),
            call_trace: NO_LINK,
            start: 1,
            end: 8,
            call_list: vec![],
        };
        (trace, call)
    }

    #[test]
    fn span_stops_at_extent_of_last_in_range_line() {
        let (trace, call) = frame();
        let span = locate_span(&trace, &call, LineRange::new(11, 12)).unwrap();
        assert_eq!(span, Some(ExecutionSpan { first: 2, last: 5 }));
    }

    #[test]
    fn span_includes_nested_callee_records() {
        let (trace, call) = frame();
        let span = locate_span(&trace, &call, LineRange::new(11, 11)).unwrap().unwrap();
        assert_eq!(span, ExecutionSpan { first: 2, last: 4 });
        assert!(span.contains(3));
    }

    #[test]
    fn span_running_to_frame_end_uses_call_end() {
        let (trace, call) = frame();
        let span = locate_span(&trace, &call, LineRange::new(13, 20)).unwrap();
        assert_eq!(span, Some(ExecutionSpan { first: 6, last: 8 }));
    }

    #[test]
    fn range_after_frame_is_empty() {
        let (trace, call) = frame();
        assert_eq!(locate_span(&trace, &call, LineRange::new(30, 35)).unwrap(), None);
    }

    #[test]
    fn range_before_frame_is_empty() {
        let (trace, call) = frame();
        assert_eq!(locate_span(&trace, &call, LineRange::new(5, 9)).unwrap(), None);
    }

    #[test]
    fn dangling_son_pointer_is_an_error() {
        let trace = Trace::new(vec![rec(1, 10, 1, 7, 1)]);
        let call = CallRecord {
            call_id: 0,
            method_name: "m".into(),
            call_trace: NO_LINK,
            start: 1,
            end: 3,
            call_list: vec![],
        };
        let err = locate_span(&trace, &call, LineRange::new(12, 13)).unwrap_err();
        assert!(matches!(err, TraceError::MissingRecord { trace_id: 7 }));
    }

    #[test]
    fn cyclic_son_pointers_are_an_error() {
        // line 11 points back at line 10
        let trace = Trace::new(vec![rec(1, 10, 1, 2, 1), rec(2, 11, 1, 1, 2)]);
        let call = CallRecord {
            call_id: 0,
            method_name: "m".into(),
            call_trace: NO_LINK,
            start: 1,
            end: 9,
            call_list: vec![],
        };
        let err = locate_span(&trace, &call, LineRange::new(20, 21)).unwrap_err();
        assert!(matches!(err, TraceError::CyclicLinks { trace_id: 1 }));

        let selfish = Trace::new(vec![rec(1, 10, 1, 1, 1)]);
        let err = locate_span(&selfish, &call, LineRange::new(10, 12)).unwrap_err();
        assert!(matches!(err, TraceError::CyclicLinks { .. }));
    }
}
