use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use super::{Message, ReasoningOracle};
use crate::errors::OracleError;

/// Replays canned replies in order and records every request.
///
/// Backs `--replay` runs and the controller tests.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Load a JSON array of reply strings.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file: {}", path.display()))?;
        let replies: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Replay file {} is not a JSON array of strings", path.display()))?;
        Ok(Self::new(replies))
    }

    /// Conversations received so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn invoke(&self, messages: &[Message]) -> Result<String, OracleError> {
        let request = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| OracleError::MalformedPayload("request log poisoned".into()))?;
            requests.push(messages.to_vec());
            requests.len()
        };
        let reply = self
            .replies
            .lock()
            .map_err(|_| OracleError::MalformedPayload("reply queue poisoned".into()))?
            .pop_front();
        reply.ok_or(OracleError::ScriptExhausted { request })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order_then_runs_dry() {
        let oracle = ScriptedOracle::new(["first", "second"]);
        assert_eq!(oracle.invoke(&[Message::user("a")]).await.unwrap(), "first");
        assert_eq!(oracle.invoke(&[Message::user("b")]).await.unwrap(), "second");
        let err = oracle.invoke(&[Message::user("c")]).await.unwrap_err();
        assert!(matches!(err, OracleError::ScriptExhausted { request: 3 }));
        assert_eq!(oracle.requests().len(), 3);
        assert_eq!(oracle.requests()[1][0].content, "b");
    }

    #[test]
    fn loads_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(&path, r#"["one", "two"]"#).unwrap();
        let oracle = ScriptedOracle::from_file(&path).unwrap();
        assert_eq!(oracle.remaining(), 2);
    }

    #[test]
    fn rejects_non_string_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(&path, r#"{"reply": 1}"#).unwrap();
        assert!(ScriptedOracle::from_file(&path).is_err());
    }
}
