//! Typed results of the eight analysis phases.

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;
use pilot_trace::LineRange;

/// One sub-range of the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// 0-based position in the block list.
    pub id: usize,
    pub start_line: i64,
    pub end_line: i64,
    pub comment: String,
}

impl CodeBlock {
    /// `- ID: 0, Line 1-5: comment`
    pub fn describe(&self) -> String {
        format!(
            "- ID: {}, Line {}-{}: {}",
            self.id, self.start_line, self.end_line, self.comment
        )
    }

    pub fn range(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }
}

/// Ordered partition of a window into contiguous blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockList {
    pub start_line: i64,
    pub end_line: i64,
    pub description: String,
    pub blocks: Vec<CodeBlock>,
}

impl BlockList {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// One [`CodeBlock::describe`] line per block.
    pub fn listing(&self) -> String {
        self.blocks
            .iter()
            .map(CodeBlock::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn block(&self, id: i64) -> Result<&CodeBlock, ParseError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.blocks.get(idx))
            .ok_or(ParseError::UnknownBlock {
                id,
                len: self.blocks.len(),
            })
    }

    /// Re-anchor the blocks onto `window` so they cover it without gaps.
    ///
    /// Ids follow reply order, the first block starts at the window start,
    /// every later block starts right after its predecessor, and the last
    /// block is stretched to the window end. A block that ends before it
    /// starts or past the window end rejects the partition.
    pub fn normalize(mut self, window: LineRange) -> Result<Self, ParseError> {
        let mut next_start = window.start;
        let count = self.blocks.len();
        for (idx, block) in self.blocks.iter_mut().enumerate() {
            block.id = idx;
            block.start_line = next_start;
            if idx + 1 == count && block.end_line < window.end {
                block.end_line = window.end;
            }
            if block.end_line < block.start_line || block.end_line > window.end {
                return Err(ParseError::BlockOutOfWindow {
                    id: idx,
                    start: block.start_line,
                    end: block.end_line,
                    window_start: window.start,
                    window_end: window.end,
                });
            }
            next_start = block.end_line + 1;
        }
        self.start_line = window.start;
        self.end_line = window.end;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionReply {
    pub analysis: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abstraction {
    pub signature: String,
    pub intent: String,
}

impl Abstraction {
    pub fn presentation(&self) -> String {
        format!("signature: \"{}\",\nintent: \"{}\"", self.signature, self.intent)
    }
}

/// A historical expectation about some object at some stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub object: String,
    pub stage: String,
    pub expect: String,
}

impl Expectation {
    pub fn render(&self) -> String {
        format!(
            "- \"object\": \"{}\", \"stage\": \"{}\", \"expect\": \"{}\"",
            self.object, self.stage, self.expect
        )
    }
}

pub fn render_expectations(items: &[Expectation]) -> String {
    items
        .iter()
        .map(Expectation::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecItem {
    pub name: String,
    pub detail: String,
}

/// Model-executable description of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub input: Vec<SpecItem>,
    pub output: Vec<SpecItem>,
    pub operational_semantics: Vec<String>,
}

impl Specification {
    pub fn render(&self) -> String {
        let mut out = String::from("\"input\":\n");
        for item in &self.input {
            out.push_str(&format!("- \"name\": \"{}\", \"detail\": \"{}\"\n", item.name, item.detail));
        }
        out.push_str("\"output\":\n");
        for item in &self.output {
            out.push_str(&format!("- \"name\": \"{}\", \"detail\": \"{}\"\n", item.name, item.detail));
        }
        out.push_str("\"operational_semantics\":\n");
        for step in &self.operational_semantics {
            out.push_str(&format!("- \"{}\"\n", step));
        }
        out
    }
}

/// Predicted value of one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleItem {
    pub name: String,
    pub analysis: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub items: Vec<OracleItem>,
}

impl Prediction {
    pub fn render(&self) -> String {
        let mut out = String::from("\"oracle\":\n");
        for item in &self.items {
            out.push_str(&format!(
                "- \"name\": \"{}\", \"analysis\": \"{}\", \"expected\": \"{}\"\n",
                item.name, item.analysis, item.expected
            ));
        }
        out
    }

    pub fn item(&self, name: &str) -> Option<&OracleItem> {
        self.items.iter().find(|item| item.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub name: String,
    pub actual: String,
    pub reason: String,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub items: Vec<MatchItem>,
    pub summary: String,
    /// Share of consistent items, in `[0, 1]`.
    pub ratio: f64,
}

impl Comparison {
    pub fn all_consistent(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.consistent)
    }
}

/// `details` of a localization: a call id to step into, or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Details {
    Call(i64),
    Text(String),
}

impl Details {
    pub fn call_id(&self) -> Option<i64> {
        match self {
            Details::Call(id) => Some(*id),
            Details::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Details {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Details::Call(id) => write!(f, "{}", id),
            Details::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    pub analysis: String,
    pub fault: i64,
    pub details: Details,
}

impl Localization {
    pub fn is_root_cause(&self) -> bool {
        self.fault == 1
    }
}
