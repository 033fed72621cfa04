//! Local Ollama server backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{BackendReply, ModelBackend};
use crate::config::BackendConfig;
use crate::error::Result;

pub const NAME: &str = "ollama";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Local inference on CPU can take minutes.
const QUERY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

/// Talks to `POST {host}/api/chat`.
pub struct OllamaBackend {
    host: String,
    model: String,
    http_client: reqwest::Client,
    probe_timeout: Duration,
    query_timeout: Duration,
}

impl OllamaBackend {
    /// Create a backend; `model` overrides the configured default.
    pub fn new(config: &BackendConfig, model: Option<&str>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("medic/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(OllamaBackend {
            host: config.ollama_host.trim_end_matches('/').to_string(),
            model: model.unwrap_or(&config.ollama_model).to_string(),
            http_client,
            probe_timeout: PROBE_TIMEOUT,
            query_timeout: QUERY_TIMEOUT,
        })
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Reply text from an `/api/chat` envelope.
pub fn extract_reply(envelope: &Value) -> Option<String> {
    envelope
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self
            .http_client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, host = %self.host, "ollama probe failed");
                false
            }
        }
    }

    async fn query(&self, prompt: &str) -> BackendReply {
        let url = format!("{}/api/chat", self.host);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = match self
            .http_client
            .post(&url)
            .timeout(self.query_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return BackendReply::Error(format!(
                    "Error: Ollama request timed out after {}s",
                    self.query_timeout.as_secs()
                ))
            }
            Err(e) => {
                return BackendReply::Error(format!(
                    "Connection Error: could not reach Ollama at {}: {e}",
                    self.host
                ))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return BackendReply::Error(format!("Error {}: {body}", status.as_u16()));
        }

        match response.json::<Value>().await {
            Ok(envelope) => match extract_reply(&envelope) {
                Some(text) => BackendReply::Text(text),
                None => BackendReply::Error("Error: unexpected response from Ollama".to_string()),
            },
            Err(e) => BackendReply::Error(format!("Error: unreadable response from Ollama: {e}")),
        }
    }

    fn setup_hint(&self) -> String {
        format!(
            "{NAME}: start the Ollama server (`ollama serve`) at {} or set OLLAMA_HOST",
            self.host
        )
    }

    fn details(&self) -> Vec<(String, String)> {
        vec![
            ("host".to_string(), self.host.clone()),
            ("model".to_string(), self.model.clone()),
        ]
    }
}
