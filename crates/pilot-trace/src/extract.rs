//! External inputs and observable outputs of a block.
//!
//! A read is external when the value it observes was produced before the
//! span started. A write is observable when its next consumer runs after the
//! span ended. Everything else is internal plumbing of the block and is left
//! out of the contract handed to the oracle.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::render::{render_listing, render_values};
use crate::span::{ExecutionSpan, LineRange, locate_span};
use crate::types::{CallRecord, FixDirection, NO_LINK, Trace, TraceFix, Variable};

/// Default nesting window (relative to the span's first record) for reads.
pub const DEFAULT_READ_SCOPE: i64 = 3;
/// Default nesting window for writes.
pub const DEFAULT_WRITE_SCOPE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub read_scope: i64,
    pub write_scope: i64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            read_scope: DEFAULT_READ_SCOPE,
            write_scope: DEFAULT_WRITE_SCOPE,
        }
    }
}

/// A variable plus the members recorded underneath it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableTree {
    pub var: Variable,
    #[serde(default)]
    pub children: Vec<VariableTree>,
}

impl VariableTree {
    pub fn leaf(var: Variable) -> Self {
        Self {
            var,
            children: Vec::new(),
        }
    }
}

/// One entry of a read or write set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicedVariable {
    /// Record the variable was observed on.
    pub trace_id: i64,
    /// `depend` for reads, `reverse` for writes.
    pub link: i64,
    pub tree: VariableTree,
}

impl SlicedVariable {
    pub fn var(&self) -> &Variable {
        &self.tree.var
    }
}

/// Read/write slice of one block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockIo {
    /// `None` when the block has no executed span.
    pub span: Option<ExecutionSpan>,
    pub reads: Vec<SlicedVariable>,
    pub writes: Vec<SlicedVariable>,
}

impl BlockIo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_none()
    }

    /// `- name: type` per read, for drafting a specification.
    pub fn input_listing(&self) -> String {
        render_listing(&self.reads)
    }

    pub fn output_listing(&self) -> String {
        render_listing(&self.writes)
    }

    /// Full name/type/value trees of the reads.
    pub fn input_values(&self) -> String {
        render_values(&self.reads)
    }

    pub fn output_values(&self) -> String {
        render_values(&self.writes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Slices a trace for the blocks of one debugging session.
pub struct DependencyExtractor<'a> {
    trace: &'a Trace,
    fixes: &'a [TraceFix],
    options: ExtractOptions,
}

impl<'a> DependencyExtractor<'a> {
    pub fn new(trace: &'a Trace, fixes: &'a [TraceFix], options: ExtractOptions) -> Self {
        Self {
            trace,
            fixes,
            options,
        }
    }

    /// Locate `range` inside `call` and slice it.
    ///
    /// A range that never executed, or a trace with dangling pointers, yields
    /// [`BlockIo::empty`] rather than an error.
    pub fn extract(&self, call: &CallRecord, range: LineRange) -> BlockIo {
        match locate_span(self.trace, call, range) {
            Ok(Some(span)) => {
                let io = self.slice(span);
                tracing::debug!(
                    call_id = call.call_id,
                    start_line = range.start,
                    end_line = range.end,
                    first = span.first,
                    last = span.last,
                    reads = io.reads.len(),
                    writes = io.writes.len(),
                    "sliced block"
                );
                io
            }
            Ok(None) => {
                tracing::warn!(
                    call_id = call.call_id,
                    "lines {}-{} have no execution span",
                    range.start,
                    range.end
                );
                BlockIo::empty()
            }
            Err(e) => {
                tracing::warn!(call_id = call.call_id, "trace walk failed: {}", e);
                BlockIo::empty()
            }
        }
    }

    /// Read/write sets of an already located span, fix-ups included.
    pub fn slice(&self, span: ExecutionSpan) -> BlockIo {
        let mut reads = self.collect(span, Direction::Read);
        let mut writes = self.collect(span, Direction::Write);

        for fix in self.fixes.iter().filter(|f| span.contains(f.trace_id)) {
            let entry = SlicedVariable {
                trace_id: fix.trace_id,
                link: NO_LINK,
                tree: VariableTree::leaf(fix.var.clone()),
            };
            match fix.io {
                FixDirection::Input => reads.push(entry),
                FixDirection::Output => writes.push(entry),
            }
        }

        BlockIo {
            span: Some(span),
            reads,
            writes,
        }
    }

    fn collect(&self, span: ExecutionSpan, direction: Direction) -> Vec<SlicedVariable> {
        let base_depth = self.trace.get(span.first).map(|r| r.depth).unwrap_or(0);
        let scope = match direction {
            Direction::Read => self.options.read_scope,
            Direction::Write => self.options.write_scope,
        };

        let mut found = Vec::new();
        for trace_id in span.first..=span.last {
            let Some(record) = self.trace.get(trace_id) else {
                break;
            };
            if record.depth - base_depth > scope {
                continue;
            }

            let vars = match direction {
                Direction::Read => &record.input,
                Direction::Write => &record.output,
            };
            for (pos, var) in vars.iter().enumerate() {
                if var.depth != 0 {
                    continue;
                }
                let (link, external) = match direction {
                    Direction::Read => {
                        let depend = var.depend_or_sentinel();
                        (depend, depend < span.first)
                    }
                    Direction::Write => {
                        let reverse = var.reverse_or_sentinel();
                        (reverse, reverse > span.last)
                    }
                };
                if !external {
                    continue;
                }

                let (children, _) = member_trees(vars, 0, pos + 1);
                found.push(SlicedVariable {
                    trace_id,
                    link,
                    tree: VariableTree {
                        var: var.clone(),
                        children,
                    },
                });
            }
        }

        deduplicate(found)
    }
}

/// Group the entries following `start` that sit deeper than `parent_depth`.
///
/// Returns the trees and the index of the first entry that no longer
/// belongs to the parent.
pub fn member_trees(vars: &[Variable], parent_depth: u32, start: usize) -> (Vec<VariableTree>, usize) {
    let mut trees = Vec::new();
    let mut pos = start;
    while pos < vars.len() {
        let node = &vars[pos];
        if node.depth <= parent_depth {
            break;
        }
        let (children, next) = member_trees(vars, node.depth, pos + 1);
        trees.push(VariableTree {
            var: node.clone(),
            children,
        });
        pos = next;
    }
    (trees, pos)
}

/// Keep the first entry per `id` and per non-sentinel `alias_id`.
pub fn deduplicate(items: Vec<SlicedVariable>) -> Vec<SlicedVariable> {
    let mut seen_ids = HashSet::new();
    let mut seen_aliases = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());

    for item in items {
        let var = item.var();
        if seen_ids.contains(&var.id) {
            continue;
        }
        if var.has_alias() && seen_aliases.contains(&var.alias_id) {
            continue;
        }
        seen_ids.insert(var.id.clone());
        if var.has_alias() {
            seen_aliases.insert(var.alias_id.clone());
        }
        unique.push(item);
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NO_ALIAS, TraceRecord};

    fn var(id: &str, name: &str, depth: u32) -> Variable {
        Variable {
            id: id.into(),
            alias_id: NO_ALIAS.into(),
            name: name.into(),
            ty: "int".into(),
            value: "0".into(),
            depth,
            depend: None,
            reverse: None,
        }
    }

    fn read(id: &str, name: &str, depend: i64) -> Variable {
        Variable {
            depend: Some(depend),
            ..var(id, name, 0)
        }
    }

    fn write(id: &str, name: &str, reverse: i64) -> Variable {
        Variable {
            reverse: Some(reverse),
            ..var(id, name, 0)
        }
    }

    fn rec(
        trace_id: i64,
        line: i64,
        depth: i64,
        son: i64,
        sip: i64,
        input: Vec<Variable>,
        output: Vec<Variable>,
    ) -> TraceRecord {
        TraceRecord {
            trace_id,
            line,
            depth,
            input,
            output,
            son,
            sip,
        }
    }

    /// Frame for lines 10..=15; line 11 calls a callee traced as records 3-4.
    fn fixture() -> (Trace, CallRecord) {
        let trace = Trace::new(vec![
            rec(1, 10, 1, 2, 1, vec![], vec![write("x1", "x", 3)]),
            rec(
                2,
                11,
                1,
                5,
                4,
                vec![read("a1", "a", NO_LINK)],
                vec![write("y1", "y", 6), write("t1", "t", 5)],
            ),
            rec(3, 40, 2, 4, 3, vec![read("x1", "x", 1)], vec![]),
            rec(4, 41, 2, NO_LINK, 4, vec![], vec![]),
            rec(
                5,
                12,
                1,
                6,
                5,
                vec![read("x1", "x", 1), read("y1", "y", 2), read("t1", "t", 2)],
                vec![write("z1", "z", 7)],
            ),
            rec(6, 13, 1, 7, 6, vec![read("y1", "y", 2)], vec![write("w1", "w", NO_LINK)]),
            rec(7, 14, 1, 8, 7, vec![read("z1", "z", 5)], vec![]),
            rec(8, 15, 1, NO_LINK, 8, vec![], vec![]),
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

    fn names(items: &[SlicedVariable]) -> Vec<&str> {
        items.iter().map(|i| i.var().name.as_str()).collect()
    }

    #[test]
    fn reads_are_values_produced_before_the_span() {
        let (trace, call) = fixture();
        let extractor = DependencyExtractor::new(&trace, &[], ExtractOptions::default());
        let io = extractor.extract(&call, LineRange::new(11, 12));

        assert_eq!(io.span, Some(ExecutionSpan { first: 2, last: 5 }));
        // y and t are produced on line 11, inside the block
        assert_eq!(names(&io.reads), vec!["a", "x"]);
        assert_eq!(io.reads[1].trace_id, 3);
        assert_eq!(io.reads[1].link, 1);
    }

    #[test]
    fn writes_are_values_consumed_after_the_span() {
        let (trace, call) = fixture();
        let extractor = DependencyExtractor::new(&trace, &[], ExtractOptions::default());
        let io = extractor.extract(&call, LineRange::new(11, 12));

        // t is consumed on line 12, inside the block
        assert_eq!(names(&io.writes), vec!["y", "z"]);
    }

    #[test]
    fn never_consumed_writes_are_not_observable() {
        let (trace, call) = fixture();
        let extractor = DependencyExtractor::new(&trace, &[], ExtractOptions::default());
        let io = extractor.extract(&call, LineRange::new(13, 13));

        assert_eq!(io.span, Some(ExecutionSpan { first: 6, last: 6 }));
        assert_eq!(names(&io.reads), vec!["y"]);
        assert!(io.writes.is_empty());
    }

    #[test]
    fn unexecuted_range_gives_empty_sentinel() {
        let (trace, call) = fixture();
        let extractor = DependencyExtractor::new(&trace, &[], ExtractOptions::default());
        let io = extractor.extract(&call, LineRange::new(50, 60));

        assert!(io.is_empty());
        assert!(io.reads.is_empty());
        assert_eq!(io.input_values(), "");
        assert_eq!(io.output_listing(), "");
    }

    #[test]
    fn read_scope_skips_deeply_nested_records() {
        let (trace, call) = fixture();
        let options = ExtractOptions {
            read_scope: 0,
            write_scope: DEFAULT_WRITE_SCOPE,
        };
        let extractor = DependencyExtractor::new(&trace, &[], options);
        let io = extractor.extract(&call, LineRange::new(11, 12));

        // x is now first seen on line 12 rather than inside the callee
        assert_eq!(names(&io.reads), vec!["a", "x"]);
        assert_eq!(io.reads[1].trace_id, 5);
    }

    #[test]
    fn fixes_inside_span_are_appended() {
        let (trace, call) = fixture();
        let fixes = vec![
            TraceFix {
                trace_id: 5,
                io: FixDirection::Output,
                var: var("r1", "result", 0),
            },
            TraceFix {
                trace_id: 8,
                io: FixDirection::Input,
                var: var("q1", "q", 0),
            },
        ];
        let extractor = DependencyExtractor::new(&trace, &fixes, ExtractOptions::default());
        let io = extractor.extract(&call, LineRange::new(11, 12));

        assert_eq!(names(&io.writes), vec!["y", "z", "result"]);
        assert_eq!(io.writes[2].link, NO_LINK);
        assert_eq!(names(&io.reads), vec!["a", "x"]);
    }

    #[test]
    fn alias_collapses_to_first_occurrence() {
        let mut first = var("1", "list", 0);
        first.alias_id = "obj@7".into();
        let mut second = var("2", "sameList", 0);
        second.alias_id = "obj@7".into();
        let third = var("3", "other", 0);
        let items = [first, second, third]
            .into_iter()
            .enumerate()
            .map(|(i, v)| SlicedVariable {
                trace_id: i as i64 + 1,
                link: NO_LINK,
                tree: VariableTree::leaf(v),
            })
            .collect();

        let unique = deduplicate(items);
        assert_eq!(names(&unique), vec!["list", "other"]);
    }

    #[test]
    fn sentinel_aliases_never_collapse() {
        let items = vec![
            SlicedVariable {
                trace_id: 1,
                link: NO_LINK,
                tree: VariableTree::leaf(var("1", "a", 0)),
            },
            SlicedVariable {
                trace_id: 2,
                link: NO_LINK,
                tree: VariableTree::leaf(var("2", "b", 0)),
            },
            SlicedVariable {
                trace_id: 3,
                link: NO_LINK,
                tree: VariableTree::leaf(var("1", "a-again", 0)),
            },
        ];
        assert_eq!(names(&deduplicate(items)), vec!["a", "b"]);
    }

    #[test]
    fn member_trees_nest_by_depth() {
        let vars = vec![
            var("1", "order", 0),
            var("2", "order.items", 1),
            var("3", "order.items.size", 2),
            var("4", "order.total", 1),
            var("5", "next", 0),
        ];
        let (trees, next) = member_trees(&vars, 0, 1);
        assert_eq!(next, 4);
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].var.name, "order.items");
        assert_eq!(trees[0].children[0].var.name, "order.items.size");
        assert_eq!(trees[1].var.name, "order.total");
        assert!(trees[1].children.is_empty());
    }
}
