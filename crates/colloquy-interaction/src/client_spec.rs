//! Cache key for provider client handles.

use colloquy_core::agent::{AgentConfig, ProviderKind};
use colloquy_core::config::ClientDefaults;
use std::time::Duration;

/// Fully resolved configuration of one client handle.
///
/// Two specs are equal when every field is equal; temperature is compared
/// by bit pattern so the type can be a hash key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientSpec {
    provider: ProviderKind,
    model: String,
    temperature_bits: u32,
    streaming: bool,
    max_tokens: u32,
    timeout: Duration,
}

impl ClientSpec {
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        temperature: f32,
        streaming: bool,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        // -0.0 and 0.0 are the same setting.
        let temperature = if temperature == 0.0 { 0.0 } else { temperature };
        Self {
            provider,
            model: model.into(),
            temperature_bits: temperature.to_bits(),
            streaming,
            max_tokens,
            timeout,
        }
    }

    /// Spec for an agent; its omitted token ceiling comes from `defaults`.
    pub fn for_agent(agent: &AgentConfig, defaults: &ClientDefaults) -> Self {
        Self::new(
            agent.provider(),
            agent.model(),
            agent.temperature(),
            defaults.streaming,
            agent.max_tokens().unwrap_or(defaults.max_tokens),
            defaults.timeout(),
        )
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        f32::from_bits(self.temperature_bits)
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::agent::{AgentBuilder, GIGACHAT_MAX};
    use std::collections::HashSet;

    fn spec(model: &str, temperature: f32, streaming: bool, max_tokens: u32, secs: u64) -> ClientSpec {
        ClientSpec::new(
            ProviderKind::GigaChat,
            model,
            temperature,
            streaming,
            max_tokens,
            Duration::from_secs(secs),
        )
    }

    #[test]
    fn test_equal_parameters_hash_equal() {
        let mut set = HashSet::new();
        set.insert(spec(GIGACHAT_MAX, 0.0, false, 8000, 300));
        assert!(!set.insert(spec(GIGACHAT_MAX, -0.0, false, 8000, 300)));
    }

    #[test]
    fn test_any_field_changes_key() {
        let base = spec(GIGACHAT_MAX, 0.7, false, 8000, 300);
        let variants = [
            spec(GIGACHAT_MAX, 0.8, false, 8000, 300),
            spec(GIGACHAT_MAX, 0.7, true, 8000, 300),
            spec(GIGACHAT_MAX, 0.7, false, 800, 300),
            spec(GIGACHAT_MAX, 0.7, false, 8000, 30),
            spec("GigaChat-2", 0.7, false, 8000, 300),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn test_for_agent_fills_defaults() {
        let agent = AgentBuilder::new("s", ProviderKind::GigaChat, GIGACHAT_MAX)
            .with_temperature(0.0)
            .build()
            .unwrap();
        let spec = ClientSpec::for_agent(&agent, &ClientDefaults::default());
        assert_eq!(spec.max_tokens(), 8000);
        assert_eq!(spec.timeout(), Duration::from_secs(300));
        assert_eq!(spec.temperature(), 0.0);
        assert!(!spec.streaming());
    }
}
