//! Explicit wiring of the application services.

use crate::conversation_service::ConversationService;
use crate::session_service::SessionService;
use crate::turn::{
    CompactionEngine, DirectTurnProcessor, ProcessorRegistry, ToolTurnProcessor, TurnServices,
};
use colloquy_core::Result;
use colloquy_core::chat::ChatKind;
use colloquy_core::config::{AppConfig, ResolvedAgents};
use colloquy_core::session::SessionRepository;
use colloquy_infrastructure::{
    ColloquyPaths, ConfigStorage, FileSessionRepository, SecretStorage, SqliteConversationStore,
};
use colloquy_interaction::{
    ClientFactory, ModelGateway, ProviderClientFactory, TokenMeter, ToolRegistry,
};
use std::sync::Arc;

/// Everything a request handler needs, constructed once at startup and
/// passed around explicitly.
pub struct AppContext {
    pub config: AppConfig,
    pub agents: ResolvedAgents,
    pub gateway: Arc<ModelGateway>,
    pub store: SqliteConversationStore,
    pub sessions: Arc<SessionService>,
    pub conversations: Arc<ConversationService>,
}

impl AppContext {
    /// Loads configuration and secrets from `paths` and opens the stores.
    pub async fn build(paths: &ColloquyPaths) -> Result<Self> {
        let config = ConfigStorage::new(paths.config_file()).load()?;
        let secret = SecretStorage::new(paths.secret_file()).gigachat()?;
        if secret.is_none() {
            tracing::warn!("[AppContext] No GigaChat credentials; GigaChat agents will fail");
        }
        let factory = ProviderClientFactory::new(config.providers.clone(), secret)?;
        let store = SqliteConversationStore::open(paths.database_file())?;
        let sessions = FileSessionRepository::new(paths.sessions_dir()).await?;

        Self::assemble(config, Arc::new(factory), store, Arc::new(sessions)).await
    }

    /// Wires the services from already constructed parts.
    ///
    /// Agents are resolved and validated here, chats are seeded into an
    /// empty store, and every tool endpoint becomes an HTTP provider.
    pub async fn assemble(
        config: AppConfig,
        factory: Arc<dyn ClientFactory>,
        store: SqliteConversationStore,
        session_repository: Arc<dyn SessionRepository>,
    ) -> Result<Self> {
        let tools = ToolRegistry::from_endpoints(&config.tools.endpoints);
        Self::assemble_with_tools(config, factory, store, session_repository, tools).await
    }

    /// Like [`assemble`](Self::assemble) with a prepared tool registry.
    pub async fn assemble_with_tools(
        config: AppConfig,
        factory: Arc<dyn ClientFactory>,
        store: SqliteConversationStore,
        session_repository: Arc<dyn SessionRepository>,
        tools: ToolRegistry,
    ) -> Result<Self> {
        let agents = config.resolve_agents()?;
        store.seed_chats(&config.chats).await?;

        let gateway = Arc::new(ModelGateway::new(
            factory,
            TokenMeter::new(config.catalog(), config.pricing.clone()),
            config.client_defaults.clone(),
            tools.clone(),
        ));
        let sessions = Arc::new(SessionService::new(session_repository));

        let turn_services = TurnServices {
            messages: Arc::new(store.clone()),
            invoker: gateway.clone(),
            agents: agents.clone(),
            default_system_prompt: config.default_system_prompt.clone(),
        };
        let endpoints = config.tools.endpoint_names();

        let mut registry = ProcessorRegistry::new();
        registry.register(
            ChatKind::Standard,
            Arc::new(
                CompactionEngine::new(turn_services.clone(), config.compaction.threshold)
                    .with_count(config.compaction.count),
            ),
        );
        registry.register(
            ChatKind::Direct,
            Arc::new(DirectTurnProcessor::new(turn_services.clone())),
        );
        registry.register(
            ChatKind::Tools,
            Arc::new(ToolTurnProcessor::new(
                turn_services,
                tools,
                endpoints.clone(),
            )),
        );

        let conversations = Arc::new(ConversationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            sessions.clone(),
            gateway.clone(),
            registry,
            agents.clone(),
            endpoints,
        ));

        tracing::info!(
            "[AppContext] Ready: main agent {} ({}), compaction threshold {}",
            agents.main.model(),
            agents.main.provider(),
            config.compaction.threshold
        );

        Ok(Self {
            config,
            agents,
            gateway,
            store,
            sessions,
            conversations,
        })
    }
}
