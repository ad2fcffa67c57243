//! Four-integer addresses of analysis checkpoints.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::errors::StateError;

static STATE_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^state_(\d+)_(\d+)_(\d+)_(\d+)\.json$").unwrap());

/// Narrowing phase: steps 1..=7 (Partition .. Comparison).
pub const NARROWING: u32 = 1;
/// Localizing phase: step 1 only.
pub const LOCALIZING: u32 = 2;

/// `(depth, iteration, phase, step)`.
///
/// Field order matters: the derived `Ord` is the lexicographic order that
/// resumption and rewind rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    pub depth: u32,
    pub iteration: u32,
    pub phase: u32,
    pub step: u32,
}

impl Coordinate {
    pub fn new(depth: u32, iteration: u32, phase: u32, step: u32) -> Result<Self, StateError> {
        let coord = Self {
            depth,
            iteration,
            phase,
            step,
        };
        coord.validate()?;
        Ok(coord)
    }

    /// The very first checkpoint of a run.
    pub fn origin() -> Self {
        Self::narrowing(1, 1, 1)
    }

    pub(crate) fn narrowing(depth: u32, iteration: u32, step: u32) -> Self {
        Self {
            depth,
            iteration,
            phase: NARROWING,
            step,
        }
    }

    pub(crate) fn localizing(depth: u32, iteration: u32) -> Self {
        Self {
            depth,
            iteration,
            phase: LOCALIZING,
            step: 1,
        }
    }

    /// Same iteration, another narrowing step.
    pub fn at_step(self, step: u32) -> Self {
        Self::narrowing(self.depth, self.iteration, step)
    }

    pub fn is_narrowing(&self) -> bool {
        self.phase == NARROWING
    }

    pub fn is_localizing(&self) -> bool {
        self.phase == LOCALIZING
    }

    /// Store key: `state_d_i_p_s.json`.
    pub fn file_name(&self) -> String {
        format!(
            "state_{}_{}_{}_{}.json",
            self.depth, self.iteration, self.phase, self.step
        )
    }

    /// Inverse of [`Coordinate::file_name`]; `None` for foreign files.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let caps = STATE_FILE_REGEX.captures(name)?;
        let part = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
        Self::new(part(1)?, part(2)?, part(3)?, part(4)?).ok()
    }

    fn validate(&self) -> Result<(), StateError> {
        let reject = |reason: &str| StateError::InvalidCoordinate {
            input: self.to_string(),
            reason: reason.to_string(),
        };
        if self.depth < 1 || self.iteration < 1 {
            return Err(reject("depth and iteration start at 1"));
        }
        match self.phase {
            NARROWING if (1..=7).contains(&self.step) => Ok(()),
            NARROWING => Err(reject("narrowing steps are 1..=7")),
            LOCALIZING if self.step == 1 => Ok(()),
            LOCALIZING => Err(reject("localizing has a single step")),
            _ => Err(reject("phase must be 1 or 2")),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.depth, self.iteration, self.phase, self.step
        )
    }
}

impl FromStr for Coordinate {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reject = |reason: &str| StateError::InvalidCoordinate {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(reject("expected exactly 4 integers separated by commas"));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| reject("all values must be non-negative integers"))?;
        }
        Self::new(values[0], values[1], values[2], values[3]).map_err(|e| match e {
            StateError::InvalidCoordinate { reason, .. } => reject(&reason),
            other => other,
        })
    }
}

impl TryFrom<String> for Coordinate {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coordinate> for String {
    fn from(coord: Coordinate) -> Self {
        coord.to_string()
    }
}
