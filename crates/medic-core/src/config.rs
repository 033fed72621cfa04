//! Environment-sourced configuration.
//!
//! Backends read their settings once, when they are constructed. Every value
//! has a default so an empty environment still yields a usable config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

/// Settings for the model backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Ollama server URL
    pub ollama_host: String,
    /// Default Ollama model
    pub ollama_model: String,
    /// OpenAI credential (absent means the cloud backend is unavailable)
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible API root
    pub openai_base_url: String,
    /// Default OpenAI model
    pub openai_model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            ollama_host: env_url("OLLAMA_HOST", DEFAULT_OLLAMA_HOST),
            ollama_model: env_or("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
            openai_api_key: non_empty_env("OPENAI_API_KEY").or_else(|| non_empty_env("API_KEY")),
            openai_base_url: env_url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
        }
    }
}

impl BackendConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config with built-in defaults only, ignoring the environment.
    pub fn defaults() -> Self {
        BackendConfig {
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }

    pub fn with_ollama_host(mut self, host: &str) -> Self {
        self.ollama_host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_openai_key(mut self, key: &str) -> Self {
        self.openai_api_key = Some(key.to_string());
        self
    }

    pub fn without_openai_key(mut self) -> Self {
        self.openai_api_key = None;
        self
    }

    pub fn with_openai_base_url(mut self, url: &str) -> Self {
        self.openai_base_url = url.trim_end_matches('/').to_string();
        self
    }
}

/// Settings for the supervisor front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicSettings {
    /// Interpreter used when the command is a lone `.py` script
    pub python: String,
    /// Directory of the daily JSON event logs
    pub log_dir: PathBuf,
}

impl Default for MedicSettings {
    fn default() -> Self {
        let log_dir = non_empty_env("MEDIC_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);
        MedicSettings {
            python: env_or("MEDIC_PYTHON", "python"),
            log_dir,
        }
    }
}

impl MedicSettings {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Expand a lone `script.py` argument into `<python> script.py`.
    pub fn build_command(&self, args: &[String]) -> Vec<String> {
        match args {
            [script] if script.ends_with(".py") => vec![self.python.clone(), script.clone()],
            _ => args.to_vec(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medic")
        .join("logs")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_string())
}

/// Like [`env_or`], without trailing slashes.
fn env_url(key: &str, default: &str) -> String {
    env_or(key, default).trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_loopback() {
        let config = BackendConfig::defaults();
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llama3.2");
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let config = BackendConfig::defaults()
            .with_ollama_host("http://127.0.0.1:9999/")
            .with_openai_base_url("http://127.0.0.1:8888/v1/");
        assert_eq!(config.ollama_host, "http://127.0.0.1:9999");
        assert_eq!(config.openai_base_url, "http://127.0.0.1:8888/v1");
    }

    #[test]
    fn test_only_urls_lose_trailing_slash() {
        std::env::set_var("MEDIC_CONFIG_TEST_MODEL", "library/llama3/");
        std::env::set_var("MEDIC_CONFIG_TEST_URL", "http://10.0.0.2:11434/");
        assert_eq!(env_or("MEDIC_CONFIG_TEST_MODEL", "x"), "library/llama3/");
        assert_eq!(env_url("MEDIC_CONFIG_TEST_URL", "x"), "http://10.0.0.2:11434");
        assert_eq!(env_url("MEDIC_CONFIG_TEST_UNSET", "http://h/"), "http://h");
    }

    #[test]
    fn test_api_key_never_serialized() {
        let config = BackendConfig::defaults().with_openai_key("sk-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_lone_script_gets_interpreter() {
        let settings = MedicSettings {
            python: "python3".to_string(),
            log_dir: PathBuf::from("/tmp"),
        };
        assert_eq!(
            settings.build_command(&["app.py".to_string()]),
            vec!["python3".to_string(), "app.py".to_string()]
        );
        let pytest = vec!["pytest".to_string(), "tests/".to_string()];
        assert_eq!(settings.build_command(&pytest), pytest);
    }
}
