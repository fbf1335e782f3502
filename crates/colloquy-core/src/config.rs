//! Application configuration values.
//!
//! Everything here is plain data deserialized from `config.toml`. Defaults
//! are applied by serde, and [`AppConfig::resolve_agents`] turns the agent
//! sections into validated [`AgentConfig`]s once, at load time.

use crate::agent::{
    AgentBuilder, AgentConfig, GIGACHAT_MAX, GIGACHAT_STANDARD, ModelCatalog, ModelEntry,
    ModelTier, ProviderKind,
};
use crate::chat::{ChatKind, DEFAULT_CHAT_ID, DEFAULT_CHAT_NAME};
use crate::error::{ColloquyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_MAX_TOKENS: u32 = 8000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 10;

pub const DEFAULT_GIGACHAT_BASE_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";
pub const DEFAULT_GIGACHAT_OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the default agent. Your job is to listen to the user. \
You are reasonably polite, but not above a witty remark. \
You can help the user find their way around the project.";

/// Root of `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub compaction: CompactionConfig,
    pub client_defaults: ClientDefaults,
    pub providers: ProvidersConfig,
    pub pricing: PricingConfig,
    /// Extra models beyond the built-in catalog.
    #[serde(rename = "model")]
    pub models: Vec<ModelEntry>,
    pub agents: AgentsConfig,
    pub default_system_prompt: String,
    pub tools: ToolsConfig,
    /// Chats seeded into an empty store.
    #[serde(rename = "chat")]
    pub chats: Vec<ChatSeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compaction: CompactionConfig::default(),
            client_defaults: ClientDefaults::default(),
            providers: ProvidersConfig::default(),
            pricing: PricingConfig::default(),
            models: Vec::new(),
            agents: AgentsConfig::default(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: ToolsConfig::default(),
            chats: vec![ChatSeed {
                id: DEFAULT_CHAT_ID.to_string(),
                name: DEFAULT_CHAT_NAME.to_string(),
                kind: ChatKind::Standard,
                system_prompt: None,
            }],
        }
    }
}

impl AppConfig {
    /// Built-in models plus the configured extras.
    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::with_extra(self.models.iter().cloned())
    }

    /// Validates the configuration and builds the role agents and the
    /// catalog of agents a session can select.
    ///
    /// Omitted agent parameters take values from `client_defaults`; the
    /// results never change after this call.
    pub fn resolve_agents(&self) -> Result<ResolvedAgents> {
        if self.compaction.threshold == 0 {
            return Err(ColloquyError::config("compaction.threshold must be positive"));
        }
        if self.client_defaults.timeout_secs == 0 {
            return Err(ColloquyError::config(
                "client_defaults.timeout_secs must be positive",
            ));
        }
        self.pricing.validate()?;

        let catalog = self.catalog();
        let main = self
            .agents
            .main
            .resolve(&self.client_defaults, &catalog)?;

        let mut selectable = BTreeMap::new();
        selectable.insert(main.id().to_string(), main.clone());
        for section in &self.agents.selectable {
            let agent = section.resolve(&self.client_defaults, &catalog)?;
            if selectable.contains_key(agent.id()) {
                return Err(ColloquyError::config(format!(
                    "duplicate agent id '{}'",
                    agent.id()
                )));
            }
            selectable.insert(agent.id().to_string(), agent);
        }

        Ok(ResolvedAgents {
            main,
            summarizer: self
                .agents
                .summarizer
                .resolve(&self.client_defaults, &catalog)?,
            prompt_engineer: self
                .agents
                .prompt_engineer
                .resolve(&self.client_defaults, &catalog)?,
            selectable,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Size at which a turn compacts the history.
    pub threshold: usize,
    /// What is compared against `threshold`.
    pub count: CompactionCount,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COMPACTION_THRESHOLD,
            count: CompactionCount::Messages,
        }
    }
}

/// How a chat's size is measured for compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionCount {
    /// Stored messages of every role.
    #[default]
    Messages,
    /// Stored user messages plus the incoming one.
    Turns,
}

/// Client parameters used when an agent or caller omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub streaming: bool,
}

impl ClientDefaults {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            temperature: crate::agent::DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            streaming: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub gigachat: GigaChatSettings,
    pub ollama: OllamaSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GigaChatSettings {
    pub base_url: String,
    pub oauth_url: String,
    pub scope: String,
    /// Accept self-signed certificates (the public endpoint uses a
    /// national CA most systems do not trust).
    pub accept_invalid_certs: bool,
}

impl Default for GigaChatSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GIGACHAT_BASE_URL.to_string(),
            oauth_url: DEFAULT_GIGACHAT_OAUTH_URL.to_string(),
            scope: DEFAULT_GIGACHAT_SCOPE.to_string(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
        }
    }
}

/// Per-token rates for the three model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub premium: f64,
    pub mid: f64,
    pub base: f64,
}

impl PriceTable {
    pub const FREE: PriceTable = PriceTable {
        premium: 0.0,
        mid: 0.0,
        base: 0.0,
    };

    pub fn rate(&self, tier: ModelTier) -> f64 {
        match tier {
            ModelTier::Premium => self.premium,
            ModelTier::Mid => self.mid,
            ModelTier::Base => self.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub gigachat: PriceTable,
    pub ollama: PriceTable,
}

impl PricingConfig {
    pub fn table(&self, provider: ProviderKind) -> &PriceTable {
        match provider {
            ProviderKind::GigaChat => &self.gigachat,
            ProviderKind::Ollama => &self.ollama,
        }
    }

    fn validate(&self) -> Result<()> {
        for (provider, table) in [("gigachat", &self.gigachat), ("ollama", &self.ollama)] {
            for rate in [table.premium, table.mid, table.base] {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(ColloquyError::config(format!(
                        "pricing.{provider}: rates must be non-negative, got {rate}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            gigachat: PriceTable {
                premium: 0.00195,
                mid: 0.0015,
                base: 0.0002,
            },
            ollama: PriceTable::FREE,
        }
    }
}

/// One `[agents.*]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl AgentSection {
    fn gigachat(id: &str, name: &str, model: &str, temperature: f32) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            provider: ProviderKind::GigaChat,
            model: model.to_string(),
            temperature: Some(temperature),
            max_tokens: None,
            system_prompt: None,
        }
    }

    fn resolve(&self, defaults: &ClientDefaults, catalog: &ModelCatalog) -> Result<AgentConfig> {
        let mut builder = AgentBuilder::new(&self.id, self.provider, &self.model)
            .with_temperature(self.temperature.unwrap_or(defaults.temperature))
            .with_max_tokens(self.max_tokens.unwrap_or(defaults.max_tokens));
        if let Some(name) = &self.name {
            builder = builder.with_name(name);
        }
        if let Some(prompt) = &self.system_prompt {
            builder = builder.with_system_prompt(prompt);
        }
        builder.build_with(catalog)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub main: AgentSection,
    pub summarizer: AgentSection,
    pub prompt_engineer: AgentSection,
    /// Agents a session may pick instead of `main` (`[[agents.selectable]]`).
    pub selectable: Vec<AgentSection>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        let mut main = AgentSection::gigachat("main", "Assistant", GIGACHAT_STANDARD, 0.6);
        main.max_tokens = Some(800);
        Self {
            main,
            summarizer: AgentSection::gigachat("summarizer", "Summarizer", GIGACHAT_MAX, 0.0),
            prompt_engineer: AgentSection::gigachat(
                "prompt_engineer",
                "Prompt Engineer",
                GIGACHAT_MAX,
                0.0,
            ),
            selectable: vec![
                AgentSection {
                    system_prompt: Some(FORMATTER_PROMPT.to_string()),
                    ..AgentSection::gigachat("formatter", "Formatter", GIGACHAT_MAX, 0.1)
                },
                AgentSection {
                    system_prompt: Some(TECH_SPEC_PROMPT.to_string()),
                    ..AgentSection::gigachat(
                        "tech_spec",
                        "Technical Specification",
                        GIGACHAT_STANDARD,
                        0.7,
                    )
                },
            ],
        }
    }
}

const FORMATTER_PROMPT: &str = "You are a system agent that answers STRICTLY in the requested format.\n\
Rules:\n\
1. No explanations, comments or introductory words.\n\
2. No Markdown highlighting or quotes.\n\
3. The answer is ONLY the body of the data structure.";

const TECH_SPEC_PROMPT: &str =
    "You coordinate the collection of requirements for a technical specification. \
Ask clarifying questions until the requirements are complete, then write the specification.";

/// Validated agents for the three invocation roles, plus the agents a
/// session can select by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgents {
    pub main: AgentConfig,
    pub summarizer: AgentConfig,
    pub prompt_engineer: AgentConfig,
    /// Keyed by agent id; always contains `main`.
    pub selectable: BTreeMap<String, AgentConfig>,
}

impl ResolvedAgents {
    /// A selectable agent by key.
    pub fn by_key(&self, key: &str) -> Option<&AgentConfig> {
        self.selectable.get(key)
    }

    /// Keys of the selectable agents, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.selectable.keys().cloned().collect()
    }
}

/// A named tool-providing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    #[serde(rename = "endpoint")]
    pub endpoints: Vec<ToolEndpoint>,
}

impl ToolsConfig {
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.name.clone()).collect()
    }
}

/// A chat created on first start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChatKind,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Contents of `secret.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default)]
    pub gigachat: Option<GigaChatSecret>,
}

/// GigaChat authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigaChatSecret {
    /// Base64 `client_id:client_secret`, sent as Basic authorization.
    pub credentials: String,
    /// Overrides `providers.gigachat.scope` when present.
    #[serde(default)]
    pub scope: Option<String>,
}
