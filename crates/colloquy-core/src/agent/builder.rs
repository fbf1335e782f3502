//! Fluent builder for [`AgentConfig`] values.

use super::AgentConfig;
use super::model::{ModelCatalog, ProviderKind};
use crate::error::{ColloquyError, Result};

/// Lowest accepted sampling temperature.
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Highest accepted sampling temperature.
pub const MAX_TEMPERATURE: f32 = 2.0;
/// Temperature used when the builder is not given one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Fluent builder for agent configurations.
///
/// # Example
/// ```
/// use colloquy_core::agent::{AgentBuilder, ProviderKind};
///
/// let agent = AgentBuilder::new("main", ProviderKind::GigaChat, "GigaChat-2")
///     .with_name("Assistant")
///     .with_temperature(0.6)
///     .with_max_tokens(800)
///     .build()
///     .unwrap();
///
/// assert_eq!(agent.model(), "GigaChat-2");
/// assert_eq!(agent.max_tokens(), Some(800));
/// ```
#[derive(Debug, Clone)]
pub struct AgentBuilder {
    id: String,
    name: Option<String>,
    provider: ProviderKind,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
}

impl AgentBuilder {
    /// Creates a builder for the given role id, provider and model.
    pub fn new(id: impl Into<String>, provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            provider,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: None,
        }
    }

    /// Sets the display name. Defaults to the id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets an optional output ceiling; `None` keeps the gateway default.
    pub fn with_optional_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Builds against the built-in model catalog.
    pub fn build(self) -> Result<AgentConfig> {
        self.build_with(&ModelCatalog::builtin())
    }

    /// Builds against `catalog`.
    ///
    /// # Errors
    /// Returns [`ColloquyError::Config`] when the id is empty, the
    /// temperature is outside `0.0..=2.0`, the token ceiling is zero, or the
    /// model is not registered for the provider.
    pub fn build_with(self, catalog: &ModelCatalog) -> Result<AgentConfig> {
        if self.id.trim().is_empty() {
            return Err(ColloquyError::config("agent id must not be empty"));
        }
        if !self.temperature.is_finite()
            || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature)
        {
            return Err(ColloquyError::config(format!(
                "agent '{}': temperature {} is outside {}..={}",
                self.id, self.temperature, MIN_TEMPERATURE, MAX_TEMPERATURE
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(ColloquyError::config(format!(
                "agent '{}': max_tokens must be positive",
                self.id
            )));
        }
        if !catalog.contains(self.provider, &self.model) {
            return Err(ColloquyError::config(format!(
                "agent '{}': unknown model '{}' for provider {}",
                self.id, self.model, self.provider
            )));
        }

        Ok(AgentConfig {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            provider: self.provider,
            temperature: self.temperature,
            model: self.model,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt,
        })
    }
}
