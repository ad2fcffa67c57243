//! Execution-trace slicing for debugpilot.
//!
//! Given a recorded trace, a call graph and a source line range inside one
//! invocation, this crate finds the trace records that executed the range
//! and derives the variables flowing into and out of it.

pub mod calls;
pub mod error;
pub mod extract;
pub mod render;
pub mod span;
pub mod types;

pub use calls::{NO_CALLS, RecordedCall, recorded_calls, render_calls};
pub use error::TraceError;
pub use extract::{BlockIo, DependencyExtractor, ExtractOptions, SlicedVariable, VariableTree};
pub use span::{ExecutionSpan, LineRange, locate_span};
pub use types::{CallGraph, CallRecord, FixDirection, NO_ALIAS, NO_LINK, Trace, TraceFix, TraceRecord, Variable};
