//! Construction of provider client handles.

use crate::client_spec::ClientSpec;
use crate::gigachat_client::{GigaChatAuth, GigaChatClient};
use crate::ollama_client::OllamaClient;
use async_trait::async_trait;
use colloquy_core::agent::ProviderKind;
use colloquy_core::config::{GigaChatSecret, ProvidersConfig};
use colloquy_core::llm::ChatClient;
use colloquy_core::{ColloquyError, Result};
use std::sync::Arc;

/// Builds a live client for a spec.
///
/// The gateway calls this only on a cache miss.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, spec: &ClientSpec) -> Result<Arc<dyn ChatClient>>;
}

/// Factory for the real GigaChat and Ollama back-ends.
pub struct ProviderClientFactory {
    providers: ProvidersConfig,
    gigachat_auth: Option<Arc<GigaChatAuth>>,
}

impl ProviderClientFactory {
    /// Creates the factory. Without a GigaChat secret, creating a GigaChat
    /// client fails with a configuration error.
    pub fn new(providers: ProvidersConfig, gigachat_secret: Option<GigaChatSecret>) -> Result<Self> {
        let gigachat_auth = match gigachat_secret {
            Some(secret) => {
                let settings = &providers.gigachat;
                let scope = secret.scope.unwrap_or_else(|| settings.scope.clone());
                Some(Arc::new(GigaChatAuth::new(
                    &settings.oauth_url,
                    secret.credentials,
                    scope,
                    settings.accept_invalid_certs,
                )?))
            }
            None => None,
        };
        Ok(Self {
            providers,
            gigachat_auth,
        })
    }
}

#[async_trait]
impl ClientFactory for ProviderClientFactory {
    async fn create(&self, spec: &ClientSpec) -> Result<Arc<dyn ChatClient>> {
        tracing::info!(
            "[ClientFactory] Creating {} client for {} (temperature={}, max_tokens={}, timeout={}s)",
            spec.provider(),
            spec.model(),
            spec.temperature(),
            spec.max_tokens(),
            spec.timeout().as_secs()
        );
        match spec.provider() {
            ProviderKind::GigaChat => {
                let auth = self.gigachat_auth.clone().ok_or_else(|| {
                    ColloquyError::config(
                        "GigaChat credentials not found in secret.json or GIGACHAT_TOKEN",
                    )
                })?;
                let settings = &self.providers.gigachat;
                Ok(Arc::new(GigaChatClient::new(
                    auth,
                    &settings.base_url,
                    spec.clone(),
                    settings.accept_invalid_certs,
                )?))
            }
            ProviderKind::Ollama => Ok(Arc::new(OllamaClient::new(
                &self.providers.ollama.base_url,
                spec.clone(),
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::agent::GIGACHAT_MAX;
    use std::time::Duration;

    fn spec(provider: ProviderKind, model: &str) -> ClientSpec {
        ClientSpec::new(provider, model, 0.7, false, 8000, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_gigachat_without_secret_is_config_error() {
        let factory = ProviderClientFactory::new(ProvidersConfig::default(), None).unwrap();
        let err = factory
            .create(&spec(ProviderKind::GigaChat, GIGACHAT_MAX))
            .await
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_ollama_needs_no_secret() {
        let factory = ProviderClientFactory::new(ProvidersConfig::default(), None).unwrap();
        assert!(
            factory
                .create(&spec(ProviderKind::Ollama, "mistral:7b"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_gigachat_with_secret() {
        let secret = GigaChatSecret {
            credentials: "c2VjcmV0".to_string(),
            scope: None,
        };
        let factory = ProviderClientFactory::new(ProvidersConfig::default(), Some(secret)).unwrap();
        assert!(
            factory
                .create(&spec(ProviderKind::GigaChat, GIGACHAT_MAX))
                .await
                .is_ok()
        );
    }
}
