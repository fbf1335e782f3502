//! Session records and persistence contract.

pub mod model;
pub mod repository;

pub use model::{
    HistoryEntry, MAX_HISTORY, MAX_SESSION_ID_LEN, PasswordBlock, ResponseFormat,
    SYSTEM_PROMPT_TAG, SessionRecord, SystemPromptBlock, validate_session_id,
};
pub use repository::{SessionMutation, SessionRepository};
