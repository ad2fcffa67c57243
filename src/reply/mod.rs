//! Parsing oracle replies into typed phase results.
//!
//! Each `parse_*` function reads the `<format>` section of one reply with
//! the helpers in [`grammar`] and rejects the whole reply when a required
//! field is absent.

pub mod grammar;
pub mod types;

pub use types::{
    Abstraction, BlockList, CodeBlock, Comparison, Details, Expectation, Localization, MatchItem,
    OracleItem, Prediction, SelectionReply, SpecItem, Specification, render_expectations,
};

use crate::errors::ParseError;
use grammar::{bullet_string, content_lines, has_key, has_keys, int_field, raw_field, string_field};

/// Block list as proposed by the oracle; see [`BlockList::normalize`].
pub fn parse_partition(reply: &str) -> Result<BlockList, ParseError> {
    const PHASE: &str = "Partition";
    let mut start_line = None;
    let mut end_line = None;
    let mut description = None;
    let mut blocks: Vec<CodeBlock> = Vec::new();

    for line in content_lines(reply) {
        if has_key(line, "start_line") {
            start_line = int_field(line, "start_line")?;
        } else if has_key(line, "end_line") {
            end_line = int_field(line, "end_line")?;
        } else if has_key(line, "description") {
            description = string_field(line, "description", None);
        } else if has_keys(line, &["line", "comment"]) {
            let Some(block_end) = int_field(line, "line")? else {
                continue;
            };
            let block_start = match blocks.last() {
                Some(prev) => prev.end_line + 1,
                None => start_line.unwrap_or(block_end),
            };
            blocks.push(CodeBlock {
                id: blocks.len(),
                start_line: block_start,
                end_line: block_end,
                comment: string_field(line, "comment", None).unwrap_or_default(),
            });
        }
    }

    let start_line = start_line.ok_or(ParseError::MissingField {
        phase: PHASE,
        field: "start_line",
    })?;
    let end_line = end_line.ok_or(ParseError::MissingField {
        phase: PHASE,
        field: "end_line",
    })?;
    let description = description.ok_or(ParseError::MissingField {
        phase: PHASE,
        field: "description",
    })?;
    if blocks.is_empty() {
        return Err(ParseError::Empty {
            phase: PHASE,
            what: "blocks",
        });
    }

    tracing::debug!(blocks = blocks.len(), start_line, end_line, "parsed partition");
    Ok(BlockList {
        start_line,
        end_line,
        description,
        blocks,
    })
}

pub fn parse_selection(reply: &str) -> Result<SelectionReply, ParseError> {
    const PHASE: &str = "Selection";
    let mut analysis = None;
    let mut id = None;

    for line in content_lines(reply) {
        if has_key(line, "analysis") {
            analysis = string_field(line, "analysis", None);
        } else if has_key(line, "id") {
            id = int_field(line, "id")?;
        }
    }

    Ok(SelectionReply {
        analysis: analysis.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "analysis",
        })?,
        id: id.ok_or(ParseError::MissingField { phase: PHASE, field: "id" })?,
    })
}

pub fn parse_abstraction(reply: &str) -> Result<Abstraction, ParseError> {
    const PHASE: &str = "Abstraction";
    let mut signature = None;
    let mut intent = None;

    for line in content_lines(reply) {
        if has_key(line, "signature") {
            signature = string_field(line, "signature", None);
        } else if has_key(line, "intent") {
            intent = string_field(line, "intent", None);
        }
    }

    Ok(Abstraction {
        signature: signature.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "signature",
        })?,
        intent: intent.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "intent",
        })?,
    })
}

/// An empty expectation list is a valid answer.
pub fn parse_extraction(reply: &str) -> Result<Vec<Expectation>, ParseError> {
    let expectations: Vec<Expectation> = content_lines(reply)
        .filter(|line| has_keys(line, &["object", "stage", "expect"]))
        .filter_map(|line| {
            Some(Expectation {
                object: string_field(line, "object", Some("stage"))?,
                stage: string_field(line, "stage", Some("expect"))?,
                expect: string_field(line, "expect", None)?,
            })
        })
        .collect();
    tracing::debug!(count = expectations.len(), "parsed extraction");
    Ok(expectations)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SpecSection {
    Input,
    Output,
    Semantics,
}

pub fn parse_combination(reply: &str) -> Result<Specification, ParseError> {
    let mut spec = Specification::default();
    let mut section = None;

    for line in content_lines(reply) {
        if has_key(line, "input") {
            section = Some(SpecSection::Input);
        } else if has_key(line, "output") {
            section = Some(SpecSection::Output);
        } else if has_key(line, "operational_semantics") {
            section = Some(SpecSection::Semantics);
        } else {
            match section {
                Some(SpecSection::Input) | Some(SpecSection::Output) => {
                    if !has_keys(line, &["name", "detail"]) {
                        continue;
                    }
                    let (Some(name), Some(detail)) = (
                        string_field(line, "name", Some("detail")),
                        string_field(line, "detail", None),
                    ) else {
                        continue;
                    };
                    let item = SpecItem { name, detail };
                    if section == Some(SpecSection::Input) {
                        spec.input.push(item);
                    } else {
                        spec.output.push(item);
                    }
                }
                Some(SpecSection::Semantics) => {
                    if let Some(step) = bullet_string(line) {
                        spec.operational_semantics.push(step);
                    }
                }
                None => {}
            }
        }
    }

    if spec.input.is_empty() && spec.output.is_empty() && spec.operational_semantics.is_empty() {
        return Err(ParseError::Empty {
            phase: "Combination",
            what: "input, output or operational_semantics entries",
        });
    }
    Ok(spec)
}

pub fn parse_prediction(reply: &str) -> Result<Prediction, ParseError> {
    let mut in_oracle = false;
    let mut items = Vec::new();

    for line in content_lines(reply) {
        if has_key(line, "oracle") {
            in_oracle = true;
        } else if in_oracle && has_keys(line, &["name", "analysis", "expected"]) {
            let parsed = (
                string_field(line, "name", Some("analysis")),
                string_field(line, "analysis", Some("expected")),
                string_field(line, "expected", None),
            );
            if let (Some(name), Some(analysis), Some(expected)) = parsed {
                items.push(OracleItem {
                    name,
                    analysis,
                    expected,
                });
            }
        }
    }

    if items.is_empty() {
        return Err(ParseError::Empty {
            phase: "Prediction",
            what: "oracle items",
        });
    }
    Ok(Prediction { items })
}

/// Raw comparison; the ratio is filled in by reconciliation.
pub fn parse_comparison(reply: &str) -> Result<Comparison, ParseError> {
    const PHASE: &str = "Comparison";
    let mut in_match = false;
    let mut summary = None;
    let mut items = Vec::new();

    for line in content_lines(reply) {
        if has_key(line, "match") {
            in_match = true;
        } else if has_key(line, "summary") {
            summary = string_field(line, "summary", None);
            in_match = false;
        } else if in_match && has_keys(line, &["name", "actual", "reason", "consistent"]) {
            let consistent = int_field(line, "consistent")?.unwrap_or_default();
            let parsed = (
                string_field(line, "name", Some("actual")),
                string_field(line, "actual", Some("reason")),
                string_field(line, "reason", Some("consistent")),
            );
            if let (Some(name), Some(actual), Some(reason)) = parsed {
                items.push(MatchItem {
                    name,
                    actual,
                    reason,
                    consistent: consistent == 1,
                });
            }
        }
    }

    if items.is_empty() {
        return Err(ParseError::Empty {
            phase: PHASE,
            what: "match items",
        });
    }
    let summary = summary.ok_or(ParseError::MissingField {
        phase: PHASE,
        field: "summary",
    })?;
    Ok(Comparison {
        items,
        summary,
        ratio: 0.0,
    })
}

pub fn parse_localization(reply: &str) -> Result<Localization, ParseError> {
    const PHASE: &str = "Localization";
    let mut analysis = None;
    let mut fault = None;
    let mut details = None;

    for line in content_lines(reply) {
        if has_key(line, "analysis") {
            analysis = string_field(line, "analysis", None);
        } else if has_key(line, "fault") {
            fault = int_field(line, "fault")?;
        } else if let Some(raw) = raw_field(line, "details") {
            details = Some(match raw.parse::<i64>() {
                Ok(id) => Details::Call(id),
                Err(_) => Details::Text(raw.trim_matches('"').to_string()),
            });
        }
    }

    Ok(Localization {
        analysis: analysis.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "analysis",
        })?,
        fault: fault.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "fault",
        })?,
        details: details.ok_or(ParseError::MissingField {
            phase: PHASE,
            field: "details",
        })?,
    })
}
