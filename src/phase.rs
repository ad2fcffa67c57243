//! The eight analysis phases and their persisted results.
//!
//! This module provides:
//! - `PhaseKind`, which phase a coordinate addresses
//! - `PhaseOutcome`, the typed result of one phase (or its failure)
//! - `PhaseRecord`, what a checkpoint stores: outcome plus the session after it

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reply::{
    Abstraction, BlockList, CodeBlock, Comparison, Expectation, Localization, Prediction,
    Specification,
};
use crate::session::Session;
use crate::state::Coordinate;
use pilot_trace::{ExecutionSpan, RecordedCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Partition,
    Selection,
    Abstraction,
    Extraction,
    Combination,
    Prediction,
    Comparison,
    Localization,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 8] = [
        PhaseKind::Partition,
        PhaseKind::Selection,
        PhaseKind::Abstraction,
        PhaseKind::Extraction,
        PhaseKind::Combination,
        PhaseKind::Prediction,
        PhaseKind::Comparison,
        PhaseKind::Localization,
    ];

    /// Phase run at `coord`. Narrowing steps map 1..=7 in order.
    pub fn from_coordinate(coord: Coordinate) -> Self {
        if coord.is_localizing() {
            return PhaseKind::Localization;
        }
        match coord.step {
            1 => PhaseKind::Partition,
            2 => PhaseKind::Selection,
            3 => PhaseKind::Abstraction,
            4 => PhaseKind::Extraction,
            5 => PhaseKind::Combination,
            6 => PhaseKind::Prediction,
            _ => PhaseKind::Comparison,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhaseKind::Partition => "Partition",
            PhaseKind::Selection => "Selection",
            PhaseKind::Abstraction => "Abstraction",
            PhaseKind::Extraction => "Extraction",
            PhaseKind::Combination => "Combination",
            PhaseKind::Prediction => "Prediction",
            PhaseKind::Comparison => "Comparison",
            PhaseKind::Localization => "Localization",
        }
    }

    /// File stem of the request template, e.g. `agent_partition`.
    pub fn template_name(&self) -> String {
        format!("agent_{}", self.name().to_lowercase())
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Concrete trace values of the block analyzed by Combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationIo {
    /// `- name: type` per read.
    pub input: String,
    /// `- name: type` per write.
    pub output: String,
    pub invalue: String,
    pub outvalue: String,
    /// `None` when the block never executed.
    pub span: Option<ExecutionSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Partition {
        blocks: BlockList,
    },
    Selection {
        analysis: String,
        block: CodeBlock,
        /// `describe()` line of the chosen block.
        selected: String,
    },
    Abstraction {
        abstraction: Abstraction,
    },
    Extraction {
        expectations: Vec<Expectation>,
    },
    Combination {
        specification: Specification,
        io: CombinationIo,
    },
    Prediction {
        prediction: Prediction,
    },
    Comparison {
        comparison: Comparison,
        /// Number of blocks the window was partitioned into.
        minimum: usize,
    },
    Localization {
        localization: Localization,
        recorded_calls: Vec<RecordedCall>,
    },
    Failed {
        message: String,
    },
}

impl PhaseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PhaseOutcome::Partition { .. } => "partition",
            PhaseOutcome::Selection { .. } => "selection",
            PhaseOutcome::Abstraction { .. } => "abstraction",
            PhaseOutcome::Extraction { .. } => "extraction",
            PhaseOutcome::Combination { .. } => "combination",
            PhaseOutcome::Prediction { .. } => "prediction",
            PhaseOutcome::Comparison { .. } => "comparison",
            PhaseOutcome::Localization { .. } => "localization",
            PhaseOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseOutcome::Failed { .. })
    }
}

/// The `result` of one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Session as left by the phase.
    pub session: Session,
    pub outcome: PhaseOutcome,
}
