use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Message, ReasoningOracle};
use crate::errors::OracleError;

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Total attempts per invocation, first try included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub backoff_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            timeout_secs: 60,
            max_attempts: 5,
            backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiOracle {
    settings: OracleSettings,
    client: Client,
}

impl OpenAiOracle {
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(OracleError::Client)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    async fn try_request(&self, messages: &[Message]) -> Result<String, String> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages,
        };
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", self.settings.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("API error ({}): {}", status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable chat completion: {}", e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| "no choices in response".to_string())
    }
}

#[async_trait]
impl ReasoningOracle for OpenAiOracle {
    async fn invoke(&self, messages: &[Message]) -> Result<String, OracleError> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.settings.backoff_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.try_request(messages).await {
                Ok(reply) => {
                    tracing::debug!(
                        model = %self.settings.model,
                        attempt = attempt + 1,
                        chars = reply.len(),
                        "oracle replied"
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    tracing::warn!(
                        "oracle request failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    last = e;
                }
            }
        }

        Err(OracleError::RetriesExhausted { attempts, last })
    }
}
