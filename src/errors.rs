//! Typed error hierarchy for debugpilot.
//!
//! One enum per subsystem:
//! - `StateError` for the checkpoint store
//! - `OracleError` for the reasoning service
//! - `ParseError` for reply parsing
//! - `PhaseError` for a single phase execution
//! - `ControllerError` for sequencing failures

use std::path::PathBuf;
use thiserror::Error;

use crate::state::Coordinate;

/// Errors from the per-session checkpoint store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access state file at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state at {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session at {path} is locked by another run")]
    Locked { path: PathBuf },

    #[error("Invalid coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },
}

/// Errors from the reasoning oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Oracle reply was malformed: {0}")]
    MalformedPayload(String),

    #[error("No API key configured (set {var})")]
    MissingApiKey { var: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Scripted oracle has no reply left for request {request}")]
    ScriptExhausted { request: usize },
}

/// Errors from parsing a reply into a typed phase result.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{phase} reply is missing required field '{field}'")]
    MissingField { phase: &'static str, field: &'static str },

    #[error("{phase} reply has no {what}")]
    Empty { phase: &'static str, what: &'static str },

    #[error("Field '{field}' is not an integer: '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("Block {id} does not exist (list has {len} blocks)")]
    UnknownBlock { id: i64, len: usize },

    #[error("Block {id} spans {start}-{end}, outside window {window_start}-{window_end}")]
    BlockOutOfWindow {
        id: usize,
        start: i64,
        end: i64,
        window_start: i64,
        window_end: i64,
    },

    #[error("Localization stepped into '{details}', which is not a recorded call id")]
    InvalidStepTarget { details: String },
}

/// Errors from one phase execution.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Method '{method}' has no source in code_info")]
    UnknownMethod { method: String },

    #[error(transparent)]
    Trace(#[from] pilot_trace::TraceError),
}

/// Errors from the phase controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Required state {coord} is missing or unreadable")]
    MissingState { coord: Coordinate },

    #[error("State {coord} holds {found}, expected {expected}")]
    UnexpectedRecord {
        coord: Coordinate,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Phase at {coord} failed: {message}")]
    PhaseFailed { coord: Coordinate, message: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}
