//! Conversation use cases.

use crate::chat_locks::ChatLocks;
use crate::session_service::SessionService;
use crate::turn::{ProcessorRegistry, TurnRequest};
use colloquy_core::agent::AgentConfig;
use colloquy_core::chat::{Chat, ChatKind, ChatRepository, Message, MessageRepository};
use colloquy_core::config::ResolvedAgents;
use colloquy_core::llm::{ModelInvoker, ToolSpec};
use colloquy_core::session::validate_session_id;
use colloquy_core::{ColloquyError, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Entry point for chat traffic.
///
/// # Responsibilities
///
/// - Validating incoming messages and resolving their chat
/// - Serializing turns per chat
/// - Passing the session's reply-format preference and selected agent to
///   the turn
/// - Dispatching the turn to the processor for the chat's kind
/// - Chat administration (create, rename, clear, delete)
pub struct ConversationService {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    sessions: Arc<SessionService>,
    invoker: Arc<dyn ModelInvoker>,
    registry: ProcessorRegistry,
    agents: ResolvedAgents,
    locks: ChatLocks,
    tool_endpoints: Vec<String>,
}

impl ConversationService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        sessions: Arc<SessionService>,
        invoker: Arc<dyn ModelInvoker>,
        registry: ProcessorRegistry,
        agents: ResolvedAgents,
        tool_endpoints: Vec<String>,
    ) -> Self {
        Self {
            chats,
            messages,
            sessions,
            invoker,
            registry,
            agents,
            locks: ChatLocks::new(),
            tool_endpoints,
        }
    }

    /// Processes one user message.
    ///
    /// # Returns
    ///
    /// The messages persisted by the turn: user message and reply for a
    /// direct turn, summary, user message and reply after compaction.
    ///
    /// # Errors
    ///
    /// - Validation error for a bad session id or a blank message
    /// - Not-found error for an unknown chat
    /// - Storage errors when the user message or the reply cannot be stored
    /// - Provider errors and timeouts from the model call
    pub async fn send_message(
        &self,
        session_id: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<Vec<Message>> {
        validate_session_id(session_id)?;
        if text.trim().is_empty() {
            return Err(ColloquyError::validation("message must not be empty"));
        }

        let _turn = self.locks.acquire(chat_id).await;
        // Loaded under the lock so a compaction that just finished is visible.
        let chat = self.require_chat(chat_id).await?;
        let format = self.sessions.get_response_format(session_id).await?;
        let agent = self.session_agent(session_id).await?;
        let request = TurnRequest::new(session_id, text)
            .with_format_instruction(format.instruction())
            .with_agent(agent);

        let processor = self.registry.get(chat.kind)?;
        tracing::debug!(
            "[Conversation] Session {} -> chat {} ({})",
            session_id,
            chat.id,
            chat.kind
        );
        processor.process(&chat, &request).await
    }

    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.require_chat(chat_id).await?;
        self.messages.list_by_chat(chat_id).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.chats.list().await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        self.chats.find(chat_id).await
    }

    /// Creates a chat with a generated id.
    pub async fn create_chat(
        &self,
        name: &str,
        kind: ChatKind,
        system_prompt: Option<&str>,
    ) -> Result<Chat> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ColloquyError::validation("chat name must not be empty"));
        }
        let mut chat = Chat::new(Uuid::new_v4().to_string(), name, kind);
        chat.system_prompt = system_prompt
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .map(str::to_string);
        self.chats.create(&chat).await?;
        tracing::info!("[Conversation] Created {} chat '{}' ({})", kind, name, chat.id);
        Ok(chat)
    }

    pub async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ColloquyError::validation("chat name must not be empty"));
        }
        self.chats.rename(chat_id, name).await
    }

    /// Removes every message of a chat. Returns how many were removed.
    pub async fn clear_chat(&self, chat_id: &str) -> Result<usize> {
        let _turn = self.locks.acquire(chat_id).await;
        self.require_chat(chat_id).await?;
        let removed = self.messages.clear_chat(chat_id).await?;
        tracing::info!("[Conversation] Cleared {} message(s) from {}", removed, chat_id);
        Ok(removed)
    }

    /// Deletes a chat and its messages. Returns whether it existed.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        let _turn = self.locks.acquire(chat_id).await;
        self.chats.delete(chat_id).await
    }

    /// Keys of the agents a session can select.
    pub fn list_agents(&self) -> Vec<String> {
        self.agents.keys()
    }

    /// Selects the agent that answers this session's turns.
    ///
    /// # Errors
    ///
    /// Not-found error when `agent_key` names no configured agent.
    pub async fn select_agent(&self, session_id: &str, agent_key: &str) -> Result<()> {
        if self.agents.by_key(agent_key).is_none() {
            return Err(ColloquyError::not_found("agent", agent_key));
        }
        self.sessions.set_agent_key(session_id, agent_key).await?;
        tracing::info!("[Conversation] Session {} selected agent {}", session_id, agent_key);
        Ok(())
    }

    /// The session's selected agent, or `None` for the main agent.
    async fn session_agent(&self, session_id: &str) -> Result<Option<AgentConfig>> {
        let Some(key) = self.sessions.get_agent_key(session_id).await? else {
            return Ok(None);
        };
        match self.agents.by_key(&key) {
            Some(agent) => Ok(Some(agent.clone())),
            None => {
                tracing::warn!(
                    "[Conversation] Session {} selected unknown agent '{}', using {}",
                    session_id,
                    key,
                    self.agents.main.id()
                );
                Ok(None)
            }
        }
    }

    /// Tools offered by the configured endpoints.
    pub async fn list_tools(&self) -> Result<Vec<(String, ToolSpec)>> {
        self.invoker.list_tools(&self.tool_endpoints).await
    }

    async fn require_chat(&self, chat_id: &str) -> Result<Chat> {
        self.chats
            .find(chat_id)
            .await?
            .ok_or_else(|| ColloquyError::not_found("chat", chat_id))
    }
}
