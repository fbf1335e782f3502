//! Token and cost metering.

use colloquy_core::agent::{ModelCatalog, ModelTier, ProviderKind};
use colloquy_core::config::PricingConfig;
use colloquy_core::llm::ChatClient;
use colloquy_core::{ColloquyError, Result};

/// Prices calls by model tier.
#[derive(Debug, Clone)]
pub struct TokenMeter {
    catalog: ModelCatalog,
    pricing: PricingConfig,
}

impl TokenMeter {
    pub fn new(catalog: ModelCatalog, pricing: PricingConfig) -> Self {
        Self { catalog, pricing }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Tier of a model; unknown models are a configuration error.
    pub fn tier(&self, provider: ProviderKind, model: &str) -> Result<ModelTier> {
        self.catalog.tier_of(provider, model).ok_or_else(|| {
            ColloquyError::config(format!("unknown model '{model}' for provider {provider}"))
        })
    }

    /// `tokens * rate` for the provider's tier rate. Never negative.
    pub fn cost(&self, provider: ProviderKind, tier: ModelTier, tokens: u32) -> f64 {
        let rate = self.pricing.table(provider).rate(tier);
        (f64::from(tokens) * rate).max(0.0)
    }
}

/// Sums the provider's token counts for `texts`.
///
/// Failures are logged and count as zero; they never fail the caller.
pub async fn count_best_effort(client: &dyn ChatClient, texts: Vec<String>, model: &str) -> u32 {
    if texts.iter().all(|t| t.is_empty()) {
        return 0;
    }
    match client.count_tokens(&texts).await {
        Ok(counts) => counts.into_iter().fold(0u32, u32::saturating_add),
        Err(e) => {
            tracing::warn!("[Meter] Token counting failed for {}: {}", model, e);
            0
        }
    }
}
