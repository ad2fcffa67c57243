//! Sequencing of the analysis phases over persisted coordinates.

mod controller;
pub mod interaction;

pub use controller::Controller;
pub use interaction::{AskReply, Restart};

use serde_json::json;

use crate::executor::LocalizeOverride;
use crate::state::Coordinate;

/// A decision forced by the person driving the session.
///
/// A run given an override executes exactly one phase after its starting
/// point and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOverride {
    /// Replace Selection's chosen block id.
    Block(usize),
    /// Replace Localization's decision.
    Localize(LocalizeOverride),
}

impl ManualOverride {
    pub fn block(&self) -> Option<usize> {
        match self {
            ManualOverride::Block(id) => Some(*id),
            ManualOverride::Localize(_) => None,
        }
    }

    pub fn localize(&self) -> Option<LocalizeOverride> {
        match self {
            ManualOverride::Localize(forced) => Some(*forced),
            ManualOverride::Block(_) => None,
        }
    }
}

/// How a controller run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A localization declared the current block faulty.
    RootCauseFound { coord: Coordinate },
    /// One phase ran under a manual override.
    Overridden { coord: Coordinate },
    Failed { message: String },
}

impl RunOutcome {
    /// The JSON document printed by `run`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RunOutcome::RootCauseFound { .. } => json!({ "state": "root cause found." }),
            RunOutcome::Overridden { .. } => json!({
                "status": "success",
                "message": "Selected parameter overridden."
            }),
            RunOutcome::Failed { message } => json!({ "status": "error", "message": message }),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}
