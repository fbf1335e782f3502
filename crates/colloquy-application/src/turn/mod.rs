//! Turn processing.
//!
//! A turn takes one user message for a chat and returns the messages it
//! persisted. Each [`ChatKind`] maps to one [`TurnProcessor`] strategy
//! through the [`ProcessorRegistry`].

mod compaction;
mod direct;
mod tool_turn;

pub use compaction::{CompactionEngine, CompactionPhase, SUMMARIZER_NAME, SUMMARY_HEADER};
pub use direct::DirectTurnProcessor;
pub use tool_turn::{TOOL_COMMAND_PREFIX, ToolTurnProcessor};

use async_trait::async_trait;
use colloquy_core::agent::AgentConfig;
use colloquy_core::chat::{Chat, ChatKind, Message, MessageRepository, MessageRole};
use colloquy_core::config::ResolvedAgents;
use colloquy_core::llm::{ChatMessage, ModelInvoker};
use colloquy_core::{ColloquyError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Display name of user messages.
pub const DEFAULT_USER_NAME: &str = "User";

/// One incoming user message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_name: String,
    pub text: String,
    /// Appended to the system message of the prompt. Never persisted.
    pub format_instruction: Option<String>,
    /// Agent selected by the session; `None` means the main agent.
    pub agent: Option<AgentConfig>,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_name: DEFAULT_USER_NAME.to_string(),
            text: text.into(),
            format_instruction: None,
            agent: None,
        }
    }

    pub fn with_format_instruction(mut self, instruction: Option<&str>) -> Self {
        self.format_instruction = instruction.map(str::to_string);
        self
    }

    pub fn with_agent(mut self, agent: Option<AgentConfig>) -> Self {
        self.agent = agent;
        self
    }
}

/// Strategy for processing a turn in one kind of chat.
#[async_trait]
pub trait TurnProcessor: Send + Sync {
    /// Processes a turn.
    ///
    /// # Returns
    ///
    /// The messages persisted by this turn, in order.
    async fn process(&self, chat: &Chat, request: &TurnRequest) -> Result<Vec<Message>>;
}

/// Collaborators shared by all processors.
#[derive(Clone)]
pub struct TurnServices {
    pub messages: Arc<dyn MessageRepository>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub agents: ResolvedAgents,
    pub default_system_prompt: String,
}

impl TurnServices {
    /// The agent answering `request`.
    pub fn agent_for<'a>(&'a self, request: &'a TurnRequest) -> &'a AgentConfig {
        request.agent.as_ref().unwrap_or(&self.agents.main)
    }

    /// The chat's override prompt, else the agent's own prompt, else the
    /// configured default.
    pub fn system_prompt_for<'a>(&'a self, chat: &'a Chat, agent: &'a AgentConfig) -> &'a str {
        let fallback = agent
            .system_prompt()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(&self.default_system_prompt);
        chat.effective_system_prompt(fallback)
    }
}

/// Maps chat kinds to processors.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<ChatKind, Arc<dyn TurnProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ChatKind, processor: Arc<dyn TurnProcessor>) {
        self.processors.insert(kind, processor);
    }

    pub fn get(&self, kind: ChatKind) -> Result<Arc<dyn TurnProcessor>> {
        self.processors
            .get(&kind)
            .cloned()
            .ok_or_else(|| ColloquyError::config(format!("no turn processor for {kind} chats")))
    }

    pub fn kinds(&self) -> Vec<ChatKind> {
        self.processors.keys().copied().collect()
    }
}

/// System message with the optional format instruction appended.
pub(crate) fn system_message(prompt: &str, format_instruction: Option<&str>) -> ChatMessage {
    match format_instruction {
        Some(instruction) => ChatMessage::system(format!("{prompt}\n\n{instruction}")),
        None => ChatMessage::system(prompt),
    }
}

/// Stored messages replayed as prompt turns.
///
/// Stored system messages are logged and left out of the prompt.
pub(crate) fn replay(history: &[Message]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|message| match message.role() {
            MessageRole::User => Some(ChatMessage::user(message.body())),
            MessageRole::Ai => Some(ChatMessage::assistant(message.body())),
            MessageRole::System => {
                tracing::debug!(
                    "[Turn] Skipping stored system message {}: {}",
                    message.id,
                    message.body()
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::chat::NewMessage;

    #[test]
    fn test_replay_skips_system_rows() {
        let mut system = NewMessage::user("c", "s", "System", "note");
        system.role = MessageRole::System;
        let history = vec![
            NewMessage::user("c", "s", "User", "hi").into_message(1),
            system.into_message(2),
            NewMessage::ai("c", "s", "main", "Assistant", "hello").into_message(3),
        ];

        let prompt = replay(&history);
        assert_eq!(
            prompt,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn test_system_message_with_format() {
        assert_eq!(system_message("Be kind", None).content, "Be kind");
        assert_eq!(
            system_message("Be kind", Some("Reply in XML")).content,
            "Be kind\n\nReply in XML"
        );
    }

    #[test]
    fn test_agent_and_prompt_resolution() {
        let (services, _store) =
            test_support::services(Arc::new(test_support::ScriptedInvoker::default()));
        let chat = Chat::new("c", "Chat", ChatKind::Direct);
        let formatter = services.agents.by_key("formatter").unwrap().clone();

        let request = TurnRequest::new("s", "hi");
        assert_eq!(services.agent_for(&request).id(), "main");
        assert_eq!(
            services.system_prompt_for(&chat, &services.agents.main),
            services.default_system_prompt
        );

        let request = request.with_agent(Some(formatter.clone()));
        assert_eq!(services.agent_for(&request).id(), "formatter");
        assert_eq!(
            services.system_prompt_for(&chat, &formatter),
            formatter.system_prompt().unwrap()
        );

        let chat = chat.with_system_prompt("Override");
        assert_eq!(services.system_prompt_for(&chat, &formatter), "Override");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProcessorRegistry::new();
        assert!(registry.get(ChatKind::Standard).err().expect("expected an error").is_config());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted invoker and an in-memory store for processor tests.

    use super::TurnServices;
    use async_trait::async_trait;
    use colloquy_core::agent::{AgentConfig, ModelTier};
    use colloquy_core::config::AppConfig;
    use colloquy_core::llm::{
        ChatMessage, ChatRole, InvocationMeta, InvocationResult, ModelInvoker, ToolSpec,
        UsageSource,
    };
    use colloquy_core::{ColloquyError, Result};
    use colloquy_infrastructure::SqliteConversationStore;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Returns queued replies in order, or an echo of the last user
    /// message once the queue is empty.
    #[derive(Default)]
    pub struct ScriptedInvoker {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
        agent_ids: Mutex<Vec<String>>,
        tool_endpoints: Mutex<Vec<Vec<String>>>,
        fail_next: AtomicBool,
    }

    impl ScriptedInvoker {
        pub fn push_replies<'a>(&self, replies: impl IntoIterator<Item = &'a str>) {
            let mut queue = self.replies.lock().unwrap();
            queue.extend(replies.into_iter().map(str::to_string));
        }

        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }

        /// Id of the agent behind each call, in order.
        pub fn agent_ids(&self) -> Vec<String> {
            self.agent_ids.lock().unwrap().clone()
        }

        pub fn tool_endpoints(&self) -> Vec<Vec<String>> {
            self.tool_endpoints.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            agent: &AgentConfig,
            messages: &[ChatMessage],
        ) -> Result<InvocationResult> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.agent_ids.lock().unwrap().push(agent.id().to_string());
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(ColloquyError::provider("scripted", "unavailable"));
            }

            let content = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == ChatRole::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                format!("reply to: {last_user}")
            });
            Ok(InvocationResult {
                content,
                prompt_tokens: 10,
                completion_tokens: 5,
                latency: Duration::from_millis(10),
                cost: 0.01,
                meta: InvocationMeta {
                    model: agent.model().to_string(),
                    tier: ModelTier::Premium,
                    usage_source: UsageSource::Provider,
                    tool_calls: 0,
                },
            })
        }

        async fn invoke_with_tools(
            &self,
            agent: &AgentConfig,
            messages: &[ChatMessage],
            endpoints: &[String],
        ) -> Result<InvocationResult> {
            self.tool_endpoints.lock().unwrap().push(endpoints.to_vec());
            self.invoke(agent, messages).await
        }

        async fn list_tools(&self, _endpoints: &[String]) -> Result<Vec<(String, ToolSpec)>> {
            Ok(Vec::new())
        }
    }

    /// Services over an in-memory store with the default agents.
    pub fn services(invoker: Arc<ScriptedInvoker>) -> (TurnServices, SqliteConversationStore) {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        let config = AppConfig::default();
        let services = TurnServices {
            messages: Arc::new(store.clone()),
            invoker,
            agents: config.resolve_agents().unwrap(),
            default_system_prompt: config.default_system_prompt,
        };
        (services, store)
    }
}
