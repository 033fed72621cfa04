//! OpenAI chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{BackendReply, ModelBackend};
use crate::config::BackendConfig;
use crate::error::Result;

pub const NAME: &str = "openai";

const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

/// Talks to `POST {base_url}/chat/completions` with bearer auth.
pub struct OpenAiBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    http_client: reqwest::Client,
    query_timeout: Duration,
}

impl OpenAiBackend {
    /// Create a backend; `model` overrides the configured default.
    pub fn new(config: &BackendConfig, model: Option<&str>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("medic/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(OpenAiBackend {
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: model.unwrap_or(&config.openai_model).to_string(),
            http_client,
            query_timeout: QUERY_TIMEOUT,
        })
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

/// Reply text from a chat-completions envelope.
pub fn extract_reply(envelope: &Value) -> Option<String> {
    envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn query(&self, prompt: &str) -> BackendReply {
        let Some(api_key) = self.api_key.as_deref() else {
            return BackendReply::Error("Error: OpenAI API key not found".to_string());
        };

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = match self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.query_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return BackendReply::Error(format!(
                    "Error: OpenAI request timed out after {}s",
                    self.query_timeout.as_secs()
                ))
            }
            Err(e) => return BackendReply::Error(format!("Connection Error: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return BackendReply::Error(format!("Error {}: {body}", status.as_u16()));
        }

        match response.json::<Value>().await {
            Ok(envelope) => match extract_reply(&envelope) {
                Some(text) => BackendReply::Text(text),
                None => BackendReply::Error("Error: unexpected response from OpenAI".to_string()),
            },
            Err(e) => BackendReply::Error(format!("Error: unreadable response from OpenAI: {e}")),
        }
    }

    fn setup_hint(&self) -> String {
        format!("{NAME}: set OPENAI_API_KEY (or API_KEY) in the environment or a .env file")
    }
}
