//! Model backends.
//!
//! A backend turns a prompt into text. Transport and protocol failures never
//! escape as errors: they come back as [`BackendReply::Error`] so the
//! pipeline can show them and finish the cycle without writing anything.

pub mod ollama;
pub mod openai;
pub mod registry;

use async_trait::async_trait;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use registry::{BackendFactory, BackendRegistry};

/// Outcome of one backend query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    /// Model output, unprocessed.
    Text(String),
    /// Human-readable description of why no answer was produced.
    Error(String),
}

impl BackendReply {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::Error(text) => text,
        }
    }
}

impl std::fmt::Display for BackendReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A language-model service that can propose code.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Registry name, e.g. `ollama`.
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Best-effort reachability/configuration probe. Must not hang.
    async fn is_available(&self) -> bool;

    /// Send `prompt` and return the reply or an error description.
    async fn query(&self, prompt: &str) -> BackendReply;

    /// What to configure when this backend is unavailable.
    fn setup_hint(&self) -> String;

    /// Extra `key: value` lines shown by `--list-backends`.
    fn details(&self) -> Vec<(String, String)> {
        vec![("model".to_string(), self.model().to_string())]
    }
}

/// Strip surrounding whitespace and every markdown fence line.
///
/// A line counts as a fence when it starts with three backticks, whatever
/// language tag follows.
pub fn strip_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_any_language_tag() {
        let raw = "\n```python\ndef f(x):\n    return x\n```\n";
        assert_eq!(strip_fences(raw), "def f(x):\n    return x");

        let raw = "```py3\nx = 1\n```";
        assert_eq!(strip_fences(raw), "x = 1");
    }

    #[test]
    fn test_strip_fences_trims_outer_whitespace_only() {
        let raw = "```\n    if x:\n        y()\n```";
        assert_eq!(strip_fences(raw), "if x:\n        y()");
    }

    #[test]
    fn test_unfenced_reply_is_only_trimmed() {
        assert_eq!(strip_fences("  return 1  \n"), "return 1");
    }

    #[test]
    fn test_reply_accessors() {
        let err = BackendReply::Error("Error: request timed out".to_string());
        assert!(err.is_error());
        assert_eq!(err.to_string(), "Error: request timed out");
        assert!(!BackendReply::Text("x".to_string()).is_error());
    }
}
