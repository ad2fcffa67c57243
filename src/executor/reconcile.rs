//! Second-guessing the oracle's own inconsistency verdicts.
//!
//! The oracle often flags values as inconsistent because of formatting
//! (`3.0` vs `3.00000000001`, reordered JSON whitespace). Such items are
//! upgraded here before the ratio is computed.

use crate::reply::{Comparison, MatchItem, Prediction};

/// Expected value meaning the prediction could not be made.
pub const NO_VALUE: &str = "No value";

const FLOAT_TOLERANCE: f64 = 1e-10;

/// Upgrade items that actually match their prediction and recompute the ratio.
pub fn reconcile(mut comparison: Comparison, prediction: &Prediction) -> Comparison {
    for item in comparison.items.iter_mut().filter(|item| !item.consistent) {
        let Some(oracle) = prediction.item(&item.name) else {
            continue;
        };
        if oracle.expected == NO_VALUE {
            continue;
        }
        if let Some(reason) = upgrade_reason(&item.actual, &oracle.expected) {
            tracing::debug!(name = %item.name, reason, "upgraded comparison item");
            item.consistent = true;
            item.reason = reason.to_string();
        }
    }
    comparison.ratio = consistency_ratio(&comparison.items);
    comparison
}

fn upgrade_reason(actual: &str, expected: &str) -> Option<&'static str> {
    if actual == expected {
        return Some("Actual value matches expected");
    }
    if let (Ok(a), Ok(e)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        if (a - e).abs() < FLOAT_TOLERANCE {
            return Some("Actual value approximately matches expected");
        }
    }
    if let (Ok(a), Ok(e)) = (
        serde_json::from_str::<serde_json::Value>(actual),
        serde_json::from_str::<serde_json::Value>(expected),
    ) {
        let structured = |v: &serde_json::Value| v.is_array() || v.is_object();
        if structured(&a) && structured(&e) && a == e {
            return Some("Actual value structurally matches expected");
        }
    }
    None
}

/// Consistent items over all items; 0 for an empty list.
pub fn consistency_ratio(items: &[MatchItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let consistent = items.iter().filter(|item| item.consistent).count();
    consistent as f64 / items.len() as f64
}
