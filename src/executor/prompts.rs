//! Request templates.
//!
//! A template is looked up as `<prompt_dir>/agent_<phase>.txt`; when that
//! file does not exist the built-in text below is used. Placeholders are
//! written `{name}`, and `{{` / `}}` produce literal braces.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::phase::PhaseKind;

const PARTITION: &str = r#"You are debugging a failing test by narrowing down the code that causes it.

Call stack from the test to the current method:
{stack}

Failing test:
{test}

What is known so far:
{context}

Current code window (line-numbered):
{code}

Split the window into a few consecutive blocks that each do one logical thing.
Every line must belong to exactly one block. Give the last line of each block.

<format>
"start_line": <first line of the window>,
"end_line": <last line of the window>,
"description": "<what the window does>",
"blocks": [
- "line": <last line of block>, "comment": "<what the block does>"
]
</format>"#;

const SELECTION: &str = r#"You are debugging a failing test.

What is known so far:
{context}

Current code window:
{code}

The window is split into these blocks:
{list}

Pick the single block most likely to contain the fault.

<format>
"analysis": "<why this block>",
"id": <block id>
</format>"#;

const ABSTRACTION: &str = r#"What is known so far:
{context}

Code window:
{code}

Selected block:
{selected}

Describe the selected block as if it were a function.

<format>
"signature": "<function-like signature of the block>",
"intent": "<what the block is meant to achieve>"
</format>"#;

const EXTRACTION: &str = r#"What is known so far:
{context}

Blocks of the window:
{list}

Selected block:
{selected}

List what the earlier analysis expects to hold for objects used by the selected block.
An empty list is acceptable.

<format>
- "object": "<object>", "stage": "<when>", "expect": "<expected property>"
</format>"#;

const COMBINATION: &str = r#"Code:
{code}

Selected block:
{selected}

Block abstraction:
{presentation}

Expectations:
{expectation}

Variables read by the block:
{input}

Variables written by the block:
{output}

Write a model-executable specification of the block.

<format>
"input": [
- "name": "<variable>", "detail": "<meaning and constraints>"
]
"output": [
- "name": "<variable>", "detail": "<meaning and constraints>"
]
"operational_semantics": [
- "<one step of the computation>"
]
</format>"#;

const PREDICTION: &str = r#"Specification:
{specification}

Concrete input values:
{invalue}

What is known so far:
{context}

Execute the specification on the inputs and predict every output.
Use "No value" when an output cannot be predicted.

<format>
"oracle": [
- "name": "<output>", "analysis": "<reasoning>", "expected": "<value>"
]
</format>"#;

const COMPARISON: &str = r#"Your prediction:
{oracle}

Actual output values:
{outvalue}

Compare each prediction with the actual value.

<format>
"match": [
- "name": "<output>", "actual": "<actual value>", "reason": "<why they (do not) match>", "consistent": <1 or 0>
]
"summary": "<what the comparison tells about the fault>"
</format>"#;

const LOCALIZATION: &str = r#"What is known so far:
{context}

Whole method:
{code}

Faulty block:
{selected}

Calls made inside the block (id: method):
{record}

Decide whether the fault is in this block itself (fault 1, details describes it)
or inside one of the calls (fault 0, details is the call id).

<format>
"analysis": "<reasoning>",
"fault": <1 or 0>,
"details": <call id or "description">
</format>"#;

fn builtin(kind: PhaseKind) -> &'static str {
    match kind {
        PhaseKind::Partition => PARTITION,
        PhaseKind::Selection => SELECTION,
        PhaseKind::Abstraction => ABSTRACTION,
        PhaseKind::Extraction => EXTRACTION,
        PhaseKind::Combination => COMBINATION,
        PhaseKind::Prediction => PREDICTION,
        PhaseKind::Comparison => COMPARISON,
        PhaseKind::Localization => LOCALIZATION,
    }
}

/// Template source for every phase.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    dir: Option<PathBuf>,
}

impl PromptSet {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Prefer `<dir>/agent_<phase>.txt` over the built-ins.
    pub fn from_dir(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    pub fn template(&self, kind: PhaseKind) -> String {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.txt", kind.template_name()));
            match std::fs::read_to_string(&path) {
                Ok(text) => return text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("unreadable template {}: {}; using built-in", path.display(), e)
                }
            }
        }
        builtin(kind).to_string()
    }

    pub fn render(&self, kind: PhaseKind, params: &[(&str, &str)]) -> String {
        let params: HashMap<&str, &str> = params.iter().copied().collect();
        fill(&self.template(kind), &params)
    }
}

/// Single-pass placeholder substitution; substituted values are never re-scanned.
fn fill(template: &str, params: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            let resolved = tail[1..].find('}').and_then(|close| {
                let key = &tail[1..1 + close];
                params.get(key).map(|value| (*value, close + 2))
            });
            match resolved {
                Some((value, consumed)) => {
                    out.push_str(value);
                    rest = &tail[consumed..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        } else {
            out.push('}');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
