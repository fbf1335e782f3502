//! Chats and their message history.

pub mod message;
pub mod model;
pub mod repository;

pub use message::{
    Message, MessageRole, NewMessage, SUMMARY_TAG, TIMESTAMP_FORMAT, now_timestamp,
    render_transcript,
};
pub use model::{Chat, ChatKind, DEFAULT_CHAT_ID, DEFAULT_CHAT_NAME};
pub use repository::{ChatRepository, MessageRepository};
