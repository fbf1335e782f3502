//! Repository traits for chats and their messages.

use super::message::{Message, NewMessage};
use super::model::Chat;
use crate::error::Result;
use async_trait::async_trait;

/// Chat-scoped, append-only message log.
///
/// Ids are assigned by the store and increase with insertion order, so
/// listing by id is listing in turn order.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Appends a message and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Storage failures surface as [`ColloquyError::Storage`](crate::ColloquyError::Storage).
    async fn append(&self, message: NewMessage) -> Result<Message>;

    /// All messages of a chat in insertion order.
    async fn list_by_chat(&self, chat_id: &str) -> Result<Vec<Message>>;

    /// Number of stored messages for a chat.
    async fn count_by_chat(&self, chat_id: &str) -> Result<usize>;

    /// Deletes every message of a chat. Returns the number removed.
    async fn clear_chat(&self, chat_id: &str) -> Result<usize>;

    /// Replaces a chat's history in one transaction.
    ///
    /// Deletes every existing message for `chat_id`, inserts `messages` in
    /// order and, when `system_prompt` is given, stores it as the chat's
    /// override prompt. Either all of it happens or none of it does.
    ///
    /// # Returns
    ///
    /// The inserted messages with their assigned ids.
    async fn replace_history(
        &self,
        chat_id: &str,
        messages: Vec<NewMessage>,
        system_prompt: Option<&str>,
    ) -> Result<Vec<Message>>;
}

/// Persistence for chat metadata.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Inserts a new chat.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a chat with the same id exists.
    async fn create(&self, chat: &Chat) -> Result<()>;

    /// Finds a chat by id.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Chat))`: Chat found
    /// - `Ok(None)`: No such chat
    async fn find(&self, chat_id: &str) -> Result<Option<Chat>>;

    /// All chats ordered by creation time.
    async fn list(&self) -> Result<Vec<Chat>>;

    /// Renames a chat. Not-found if it does not exist.
    async fn rename(&self, chat_id: &str, name: &str) -> Result<()>;

    /// Sets or clears the override system prompt.
    async fn update_system_prompt(&self, chat_id: &str, prompt: Option<&str>) -> Result<()>;

    /// Deletes a chat and its messages. Returns whether it existed.
    async fn delete(&self, chat_id: &str) -> Result<bool>;
}
