use thiserror::Error;

/// Structural problems found while walking a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace record {trace_id} does not exist")]
    MissingRecord { trace_id: i64 },

    #[error("call {call_id} is not in the call graph")]
    UnknownCall { call_id: i64 },

    #[error("son links starting at trace record {trace_id} form a cycle")]
    CyclicLinks { trace_id: i64 },
}
