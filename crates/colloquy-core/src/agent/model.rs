//! Provider kinds, model tiers and the model catalog.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Remote model backends the gateway can talk to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    /// Sber GigaChat REST API.
    GigaChat,
    /// Local Ollama server.
    Ollama,
}

/// Pricing tier of a model.
///
/// Cost is `tokens * rate` where the rate is chosen by tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelTier {
    Premium,
    Mid,
    Base,
}

/// A model id registered for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: ProviderKind,
    pub model: String,
    pub tier: ModelTier,
}

/// GigaChat base model.
pub const GIGACHAT_STANDARD: &str = "GigaChat-2";
/// GigaChat mid-tier model.
pub const GIGACHAT_PRO: &str = "GigaChat-2-Pro";
/// GigaChat top-tier model, used for summaries and prompt rewriting.
pub const GIGACHAT_MAX: &str = "GigaChat-2-Max";

const BUILTIN_MODELS: &[(ProviderKind, &str, ModelTier)] = &[
    (ProviderKind::GigaChat, GIGACHAT_STANDARD, ModelTier::Base),
    (ProviderKind::GigaChat, GIGACHAT_PRO, ModelTier::Mid),
    (ProviderKind::GigaChat, GIGACHAT_MAX, ModelTier::Premium),
    (ProviderKind::Ollama, "tinyllama:latest", ModelTier::Base),
    (ProviderKind::Ollama, "mistral:7b", ModelTier::Mid),
    (ProviderKind::Ollama, "llama2:13b", ModelTier::Premium),
    (ProviderKind::Ollama, "neural-chat:7b", ModelTier::Mid),
    (ProviderKind::Ollama, "starling-lm:7b", ModelTier::Mid),
    (ProviderKind::Ollama, "openchat:7b", ModelTier::Mid),
];

/// Registry of known models.
///
/// Starts with the built-in GigaChat and Ollama models; deployments can
/// register more through configuration. Lookups are exact on the model id.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    /// Catalog containing only the built-in models.
    pub fn builtin() -> Self {
        let entries = BUILTIN_MODELS
            .iter()
            .map(|(provider, model, tier)| ModelEntry {
                provider: *provider,
                model: (*model).to_string(),
                tier: *tier,
            })
            .collect();
        Self { entries }
    }

    /// Built-in models plus `extra`. Later entries win on duplicate ids.
    pub fn with_extra(extra: impl IntoIterator<Item = ModelEntry>) -> Self {
        let mut catalog = Self::builtin();
        for entry in extra {
            catalog
                .entries
                .retain(|e| !(e.provider == entry.provider && e.model == entry.model));
            catalog.entries.push(entry);
        }
        catalog
    }

    /// Tier of a model, or `None` if the model is unknown for the provider.
    pub fn tier_of(&self, provider: ProviderKind, model: &str) -> Option<ModelTier> {
        self.entries
            .iter()
            .find(|e| e.provider == provider && e.model == model)
            .map(|e| e.tier)
    }

    pub fn contains(&self, provider: ProviderKind, model: &str) -> bool {
        self.tier_of(provider, model).is_some()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
