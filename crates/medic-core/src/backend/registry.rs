//! Name-keyed backend construction and availability-based selection.
//!
//! Backends are registered as factories, so adding a variant never touches
//! callers. Auto-selection walks the preference list, constructing and probing
//! one backend at a time; later entries are never built once an earlier one
//! answers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{ollama, openai, ModelBackend, OllamaBackend, OpenAiBackend};
use crate::config::BackendConfig;
use crate::error::{MedicError, Result};

/// Builds a backend from config and an optional model override.
pub type BackendFactory =
    Arc<dyn Fn(&BackendConfig, Option<&str>) -> Result<Box<dyn ModelBackend>> + Send + Sync>;

/// Registry of backend factories plus the auto-select order.
#[derive(Clone)]
pub struct BackendRegistry {
    config: BackendConfig,
    factories: BTreeMap<String, BackendFactory>,
    preference: Vec<String>,
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
            preference: Vec::new(),
        }
    }

    /// Registry with `ollama` and `openai`, preferring the local server.
    pub fn with_defaults(config: BackendConfig) -> Self {
        let mut registry = Self::new(config);
        registry
            .factories
            .insert(ollama::NAME.to_string(), Arc::new(build_ollama));
        registry
            .factories
            .insert(openai::NAME.to_string(), Arc::new(build_openai));
        registry.preference = vec![ollama::NAME.to_string(), openai::NAME.to_string()];
        registry
    }

    /// Register a factory under `name` and append it to the preference order.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(MedicError::DuplicateBackend(name));
        }
        self.factories.insert(name.clone(), factory);
        self.preference.push(name);
        Ok(())
    }

    /// Replace the auto-select order. Unregistered names are ignored at selection.
    pub fn with_preference<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preference = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Registered names in preference order, then any others alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .preference
            .iter()
            .filter(|n| self.factories.contains_key(*n))
            .cloned()
            .collect();
        for name in self.factories.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Construct the backend registered as `name`.
    pub fn create(&self, name: &str, model: Option<&str>) -> Result<Box<dyn ModelBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            MedicError::UnknownBackend(name.to_string(), self.names().join(", "))
        })?;
        factory(&self.config, model)
    }

    /// First available backend in preference order.
    pub async fn auto_select(&self, model: Option<&str>) -> Result<Box<dyn ModelBackend>> {
        let mut hints = Vec::new();
        for name in &self.preference {
            if !self.factories.contains_key(name) {
                continue;
            }
            let backend = self.create(name, model)?;
            if backend.is_available().await {
                debug!(backend = %name, "auto-selected backend");
                return Ok(backend);
            }
            debug!(backend = %name, "backend unavailable");
            hints.push(backend.setup_hint());
        }
        Err(MedicError::NoBackendAvailable { hints })
    }

    /// The named backend when given, otherwise [`Self::auto_select`].
    pub async fn select(
        &self,
        name: Option<&str>,
        model: Option<&str>,
    ) -> Result<Box<dyn ModelBackend>> {
        match name {
            Some(name) => self.create(name, model),
            None => self.auto_select(model).await,
        }
    }
}

fn build_ollama(config: &BackendConfig, model: Option<&str>) -> Result<Box<dyn ModelBackend>> {
    Ok(Box::new(OllamaBackend::new(config, model)?))
}

fn build_openai(config: &BackendConfig, model: Option<&str>) -> Result<Box<dyn ModelBackend>> {
    Ok(Box::new(OpenAiBackend::new(config, model)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_prefer_local() {
        let registry = BackendRegistry::with_defaults(BackendConfig::defaults());
        assert_eq!(registry.names(), vec!["ollama", "openai"]);
    }

    #[test]
    fn test_unknown_backend_lists_registered() {
        let registry = BackendRegistry::with_defaults(BackendConfig::defaults());
        let err = registry.create("claude", None).err().expect("unknown");
        let msg = err.to_string();
        assert!(msg.contains("claude"));
        assert!(msg.contains("ollama, openai"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = BackendRegistry::with_defaults(BackendConfig::defaults());
        let factory: BackendFactory = Arc::new(build_ollama);
        assert!(matches!(
            registry.register("ollama", factory),
            Err(MedicError::DuplicateBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_nothing_available_lists_both_hints() {
        let config = BackendConfig::defaults()
            .with_ollama_host("http://127.0.0.1:9")
            .without_openai_key();
        let registry = BackendRegistry::with_defaults(config);
        match registry.auto_select(None).await {
            Err(MedicError::NoBackendAvailable { hints }) => {
                assert_eq!(hints.len(), 2);
                assert!(hints[0].contains("OLLAMA_HOST"));
                assert!(hints[1].contains("OPENAI_API_KEY"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(backend) => panic!("unexpected backend: {}", backend.name()),
        }
    }

    #[tokio::test]
    async fn test_cloud_selected_when_local_down() {
        let config = BackendConfig::defaults()
            .with_ollama_host("http://127.0.0.1:9")
            .with_openai_key("sk-test");
        let registry = BackendRegistry::with_defaults(config);
        let backend = registry.auto_select(Some("gpt-4o")).await.unwrap();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_explicit_name_skips_probe() {
        let config = BackendConfig::defaults().with_ollama_host("http://127.0.0.1:9");
        let registry = BackendRegistry::with_defaults(config);
        let backend = registry.select(Some("ollama"), None).await.unwrap();
        assert_eq!(backend.name(), "ollama");
    }
}
