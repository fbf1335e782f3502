//! Immutable per-role agent configuration.

use super::model::ProviderKind;
use serde::{Deserialize, Serialize};

/// Everything needed to invoke a model for one role
/// (main responder, summarizer, prompt engineer).
///
/// Values are only produced by [`AgentBuilder`](super::AgentBuilder), which
/// validates the model id and temperature. A turn that needs different
/// parameters builds a new value instead of editing a shared one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) provider: ProviderKind,
    pub(super) temperature: f32,
    pub(super) model: String,
    pub(super) max_tokens: Option<u32>,
    pub(super) system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name written into persisted messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Output token ceiling; `None` means the gateway default.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Returns a copy with a different system prompt.
    ///
    /// Used when the prompt is only known per turn (chat override or a
    /// freshly regenerated prompt); the original value is left untouched.
    pub fn with_system_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..self.clone()
        }
    }
}
