//! Collaborator inputs for one benchmark bug.
//!
//! `<benchmark_dir>/<project>_<bug>/` holds the call graph, method sources,
//! the failing-test description, the execution trace and optional trace
//! fix-ups, all produced by the external tracer.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pilot_trace::{CallGraph, Trace, TraceFix};

pub const CALL_INFO: &str = "call_info.json";
pub const CODE_INFO: &str = "code_info.json";
pub const START_INFO: &str = "start_info.json";
pub const TRACE: &str = "original.json";
pub const TRACE_FIX: &str = "trace_fix.json";

/// Line-numbered source of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSource {
    pub start_line: i64,
    pub end_line: i64,
    /// Every line prefixed with its source line number.
    pub whole: String,
}

/// Where the failing test starts and how it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInfo {
    /// Call id of the test method's invocation.
    pub test_trace: i64,
    /// Method name of the test, a key of `code_info`.
    pub test_unit: String,
    pub test_task: String,
    pub test_failure: String,
}

#[derive(Debug, Clone)]
pub struct DebugData {
    pub calls: CallGraph,
    pub code: HashMap<String, MethodSource>,
    pub start: StartInfo,
    pub trace: Trace,
    pub fixes: Vec<TraceFix>,
}

impl DebugData {
    pub fn bug_dir(benchmark_dir: &Path, project: &str, bug: &str) -> PathBuf {
        benchmark_dir.join(format!("{}_{}", project, bug))
    }

    /// Load every input file from `dir`. A missing `trace_fix.json` means no fix-ups.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Data directory not found: {}", dir.display());
        }

        let calls: CallGraph = read_json(&dir.join(CALL_INFO))?;
        let code: HashMap<String, MethodSource> = read_json(&dir.join(CODE_INFO))?;
        let start: StartInfo = read_json(&dir.join(START_INFO))?;
        let trace: Trace = read_json(&dir.join(TRACE))?;

        let fix_path = dir.join(TRACE_FIX);
        let fixes: Vec<TraceFix> = if fix_path.exists() {
            read_json(&fix_path)?
        } else {
            tracing::debug!("no {} in {}, continuing without fix-ups", TRACE_FIX, dir.display());
            Vec::new()
        };

        tracing::info!(
            calls = calls.len(),
            methods = code.len(),
            trace = trace.len(),
            fixes = fixes.len(),
            test_unit = %start.test_unit,
            "loaded debug data from {}",
            dir.display()
        );

        Ok(Self {
            calls,
            code,
            start,
            trace,
            fixes,
        })
    }

    pub fn method(&self, name: &str) -> Option<&MethodSource> {
        self.code.get(name)
    }

    /// Test task followed by the failure message.
    pub fn failure_report(&self) -> String {
        format!("{}\n{}", self.start.test_task, self.start.test_failure)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Required data file not found: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON format in {}", path.display()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_sample_without_trace_fix() {
        let root = tempdir().unwrap();
        let dir = sample::write_bug(root.path(), "Lang", "1");
        let data = DebugData::load(&dir).unwrap();
        assert_eq!(data.calls.len(), 2);
        assert_eq!(data.method("Calc#add").unwrap().start_line, 20);
        assert_eq!(data.trace.len(), 6);
        assert!(data.fixes.is_empty());
        assert_eq!(
            data.failure_report(),
            "adding 1 and 2 gives 3\nexpected 3 but was -1"
        );
    }

    #[test]
    fn test_load_reads_trace_fix() {
        let root = tempdir().unwrap();
        let dir = sample::write_bug(root.path(), "Lang", "1");
        std::fs::write(
            dir.join(TRACE_FIX),
            r#"[{"trace_id": 3, "io": "input", "var": {"id": "k", "name": "k", "type": "int", "value": "0"}}]"#,
        )
        .unwrap();
        let data = DebugData::load(&dir).unwrap();
        assert_eq!(data.fixes.len(), 1);
    }

    #[test]
    fn test_missing_dir_is_error() {
        let root = tempdir().unwrap();
        let err = DebugData::load(&root.path().join("Nope_9")).unwrap_err();
        assert!(err.to_string().contains("Data directory not found"));
    }

    #[test]
    fn test_corrupt_file_names_path() {
        let root = tempdir().unwrap();
        let dir = sample::write_bug(root.path(), "Lang", "1");
        std::fs::write(dir.join(START_INFO), "{ not json").unwrap();
        let err = DebugData::load(&dir).unwrap_err();
        assert!(format!("{:#}", err).contains(START_INFO));
    }
}
