//! Credential-driven backend registry.
//!
//! Which models participate in a run is decided at runtime by which API keys
//! are present. The registry maps backend names to adapter factories and
//! yields handles only for names whose credential is set, in registration
//! order, so pairing stays deterministic. No per-provider conditionals leak
//! past this module.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::gateway::{
    BackendGateway, ChatBackend, CohereAdapter, GatewayConfig, OpenAiChatAdapter,
    OpenAiCompletionsAdapter, ProviderError, UsageSink,
};

/// A named, run-scoped reference to one backend. Names are unique within a
/// run and double as the reporting and tie-break key.
#[derive(Clone)]
pub struct ModelHandle {
    name: Arc<str>,
    backend: Arc<dyn ChatBackend>,
}

impl ModelHandle {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            name: name.into().into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate backend name: {0}")]
    DuplicateName(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

type AdapterFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn ChatBackend>, ProviderError> + Send + Sync>;

struct Entry {
    name: String,
    env_key: &'static str,
    factory: AdapterFactory,
}

/// Ordered mapping from backend name to adapter factory.
#[derive(Default)]
pub struct BackendRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field(
                "entries",
                &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in backend set: Cohere generate, an OpenAI completion-style
    /// instruct model, and OpenAI chat.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("cohere/command", "COHERE_API_KEY", |key| {
                Ok(Arc::new(CohereAdapter::new(key, "command")?))
            })
            .expect("standard registry names are distinct");
        registry
            .register("openai/gpt-3.5-turbo-instruct", "OPENAI_API_KEY", |key| {
                Ok(Arc::new(OpenAiCompletionsAdapter::new(
                    key,
                    "gpt-3.5-turbo-instruct",
                )?))
            })
            .expect("standard registry names are distinct");
        registry
            .register("openai/gpt-3.5-turbo", "OPENAI_API_KEY", |key| {
                Ok(Arc::new(OpenAiChatAdapter::new(key, "gpt-3.5-turbo")?))
            })
            .expect("standard registry names are distinct");
        registry
    }

    /// Register a backend. The factory receives the credential and builds the
    /// raw adapter; gateway wrapping happens at handle construction.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        env_key: &'static str,
        factory: impl Fn(&str) -> Result<Arc<dyn ChatBackend>, ProviderError> + Send + Sync + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.entries.push(Entry {
            name,
            env_key,
            factory: Box::new(factory),
        });
        Ok(self)
    }

    /// All registered backend names, in order, regardless of credentials.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Handles for every backend whose credential is present and non-empty,
    /// wrapped in a retrying gateway, in registration order.
    pub fn available_handles<U: UsageSink>(
        &self,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Result<Vec<ModelHandle>, RegistryError> {
        self.available_handles_with(|key| std::env::var(key).ok(), usage_sink, config)
    }

    /// Credential lookup injected for testability.
    pub fn available_handles_with<U: UsageSink>(
        &self,
        credential: impl Fn(&str) -> Option<String>,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Result<Vec<ModelHandle>, RegistryError> {
        let mut handles = Vec::new();
        for entry in &self.entries {
            let Some(key) = credential(entry.env_key).filter(|k| !k.trim().is_empty()) else {
                continue;
            };
            let adapter = (entry.factory)(&key)?;
            let gateway = BackendGateway::new(adapter, Arc::clone(&usage_sink), config.clone());
            handles.push(ModelHandle::new(entry.name.clone(), Arc::new(gateway)));
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::NoopUsageSink;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = BackendRegistry::new();
        registry
            .register("m", "KEY_A", |key| {
                Ok(Arc::new(OpenAiChatAdapter::new(key, "m")?))
            })
            .unwrap();
        let err = registry
            .register("m", "KEY_B", |key| {
                Ok(Arc::new(OpenAiChatAdapter::new(key, "m")?))
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[test]
    fn only_backends_with_credentials_get_handles() {
        let registry = BackendRegistry::standard();
        let handles = registry
            .available_handles_with(
                |key| (key == "OPENAI_API_KEY").then(|| "sk-test".to_string()),
                Arc::new(NoopUsageSink),
                GatewayConfig::default(),
            )
            .unwrap();

        let names: Vec<&str> = handles.iter().map(|h| h.name()).collect();
        assert_eq!(
            names,
            vec!["openai/gpt-3.5-turbo-instruct", "openai/gpt-3.5-turbo"]
        );
    }

    #[test]
    fn empty_credentials_do_not_count() {
        let registry = BackendRegistry::standard();
        let handles = registry
            .available_handles_with(
                |_| Some("   ".to_string()),
                Arc::new(NoopUsageSink),
                GatewayConfig::default(),
            )
            .unwrap();
        assert!(handles.is_empty());
    }

    #[test]
    fn handle_order_follows_registration_order() {
        let registry = BackendRegistry::standard();
        let handles = registry
            .available_handles_with(
                |_| Some("sk-test".to_string()),
                Arc::new(NoopUsageSink),
                GatewayConfig::default(),
            )
            .unwrap();
        let names: Vec<&str> = handles.iter().map(|h| h.name()).collect();
        assert_eq!(
            names,
            vec![
                "cohere/command",
                "openai/gpt-3.5-turbo-instruct",
                "openai/gpt-3.5-turbo"
            ]
        );
    }
}
